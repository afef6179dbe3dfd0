//! Inbound connection admission
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. client identifier against the client-id allow-list
//! 2. username/password against the credential allow-lists
//!
//! An empty allow-list leaves its dimension unchecked. Credentials are only
//! checked when both the username and the password lists are non-empty.

use crate::config::{AdmissionPolicyConfig, CredentialMatching};
use crate::transport::{AdmissionDecision, ConnectionRequest, RejectReason};
use tracing::{debug, warn};

/// Allow-list gate consulted by the broker engine before accepting a client
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerAdmissionPolicy {
    config: AdmissionPolicyConfig,
}

impl ServerAdmissionPolicy {
    pub fn new(config: AdmissionPolicyConfig) -> Self {
        Self { config }
    }

    /// Listening port override, if one is configured
    pub fn port_override(&self) -> Option<u16> {
        (self.config.port > 0).then_some(self.config.port)
    }

    pub fn config(&self) -> &AdmissionPolicyConfig {
        &self.config
    }

    pub fn evaluate(&self, request: &ConnectionRequest) -> AdmissionDecision {
        if !self.client_id_allowed(&request.client_id) {
            warn!(
                client_id = %request.client_id,
                peer = ?request.peer_addr,
                "Rejecting connection: {}",
                RejectReason::ClientIdentifierNotValid
            );
            return AdmissionDecision::Reject(RejectReason::ClientIdentifierNotValid);
        }

        if !self.credentials_allowed(request.username.as_deref(), request.password.as_deref()) {
            // Never log the attempted password
            warn!(
                client_id = %request.client_id,
                username = ?request.username,
                peer = ?request.peer_addr,
                "Rejecting connection: {}",
                RejectReason::BadUserNameOrPassword
            );
            return AdmissionDecision::Reject(RejectReason::BadUserNameOrPassword);
        }

        debug!(client_id = %request.client_id, "Connection admitted");
        AdmissionDecision::Accept
    }

    fn client_id_allowed(&self, client_id: &str) -> bool {
        let allowed = &self.config.client_ids;
        allowed.is_empty() || allowed.iter().any(|id| id == client_id)
    }

    fn credentials_allowed(&self, username: Option<&str>, password: Option<&str>) -> bool {
        let usernames = &self.config.usernames;
        let passwords = &self.config.passwords;
        if usernames.is_empty() || passwords.is_empty() {
            return true;
        }

        let (Some(username), Some(password)) = (username, password) else {
            return false;
        };

        match self.config.credential_matching {
            CredentialMatching::Independent => {
                usernames.iter().any(|u| u == username) && passwords.iter().any(|p| p == password)
            }
            CredentialMatching::Positional => usernames
                .iter()
                .position(|u| u == username)
                .and_then(|index| passwords.get(index))
                .is_some_and(|p| p == password),
        }
    }
}
