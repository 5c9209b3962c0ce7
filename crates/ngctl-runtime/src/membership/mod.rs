//! Registering the fleet with the control plane and waiting for its nodes.

pub mod kubectl;
pub mod verifier;

pub use kubectl::{Kubectl, KubectlError};
pub use verifier::MembershipVerifier;
