//! Role types for conversation participants.

use serde::{Deserialize, Serialize};

/// Roles for messages sent to a generative provider.
///
/// # Examples
///
/// ```
/// use fabula_core::Role;
///
/// assert_ne!(Role::User, Role::Assistant);
/// assert_eq!(format!("{}", Role::System), "System");
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub enum Role {
    /// System messages provide context and instructions
    System,
    /// User messages carry the generation prompt
    User,
    /// Assistant messages are prior model output
    Assistant,
}
