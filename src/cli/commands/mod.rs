pub mod firm;
pub mod migrate;
pub mod superadmin;

use crate::config::config;
use crate::filter::LimitPolicy;

pub(crate) fn limit_policy() -> LimitPolicy {
    LimitPolicy::from(&config().pagination)
}
