//! Shared test harness modules for the nuisance CLI.

use super::*;

mod feature_flags;
mod helpers;
