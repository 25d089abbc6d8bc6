/// Declares a string-backed enum stored in a TEXT column with a CHECK constraint
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for crate::filter::SqlParam {
            fn from(value: $name) -> Self {
                crate::filter::SqlParam::text(value.as_str())
            }
        }
    };
}

pub mod attachment;
pub mod audit_log;
pub mod case;
pub mod client;
pub mod firm;
pub mod task;
pub mod user;

pub use attachment::Attachment;
pub use audit_log::AuditLog;
pub use case::{Case, CaseStatus};
pub use client::{Client, ClientType};
pub use firm::{Firm, FirmStatus};
pub use task::{Task, TaskPriority, TaskStatus};
pub use user::User;
