use crate::errors::{BackendError, BackendErrorKind};
use std::sync::{Mutex, OnceLock};

pub const NETWORK_POLICY_ENV: &str = "CASCADE_NETWORK_POLICY";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkPolicy {
    Allow,
    Deny(String),
    /// Only the listed hosts (exact, case-insensitive) may be reached.
    AllowHosts(Vec<String>),
}

#[derive(Debug)]
struct NetworkState {
    policy: NetworkPolicy,
}

fn state() -> &'static Mutex<NetworkState> {
    static STATE: OnceLock<Mutex<NetworkState>> = OnceLock::new();
    STATE.get_or_init(|| {
        Mutex::new(NetworkState {
            policy: NetworkPolicy::Allow,
        })
    })
}

fn current() -> NetworkPolicy {
    match state().lock() {
        Ok(s) => s.policy.clone(),
        Err(poisoned) => poisoned.into_inner().policy.clone(),
    }
}

fn replace(policy: NetworkPolicy) -> NetworkPolicy {
    let mut s = match state().lock() {
        Ok(s) => s,
        Err(poisoned) => poisoned.into_inner(),
    };
    std::mem::replace(&mut s.policy, policy)
}

/// Scoped policy override; the previous policy is restored on drop.
pub struct NetworkPolicyGuard {
    previous: NetworkPolicy,
}

impl NetworkPolicyGuard {
    pub fn set(policy: NetworkPolicy) -> Self {
        Self {
            previous: replace(policy),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self::set(NetworkPolicy::Deny(reason.into()))
    }

    pub fn allow_hosts(hosts: &[&str]) -> Self {
        Self::set(NetworkPolicy::AllowHosts(
            hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
        ))
    }
}

impl Drop for NetworkPolicyGuard {
    fn drop(&mut self) {
        replace(self.previous.clone());
    }
}

fn blocked(target: &str, reason: &str) -> BackendError {
    BackendError::new(
        BackendErrorKind::Network,
        format!(
            "outbound network blocked by policy (target={}): {}",
            target, reason
        ),
    )
}

pub fn check_outbound(target: &str) -> Result<(), BackendError> {
    match effective_policy() {
        NetworkPolicy::Allow => Ok(()),
        NetworkPolicy::Deny(reason) => Err(blocked(target, &reason)),
        NetworkPolicy::AllowHosts(hosts) => {
            let host = reqwest::Url::parse(target)
                .ok()
                .and_then(|url| url.host_str().map(str::to_ascii_lowercase));
            match host {
                Some(host) if hosts.iter().any(|h| *h == host) => Ok(()),
                Some(host) => Err(blocked(target, &format!("host '{}' not allowlisted", host))),
                None => Err(blocked(target, "target is not a valid url")),
            }
        }
    }
}

fn effective_policy() -> NetworkPolicy {
    if let Ok(raw) = std::env::var(NETWORK_POLICY_ENV) {
        if raw.trim().eq_ignore_ascii_case("deny") {
            return NetworkPolicy::Deny(format!("{}=deny", NETWORK_POLICY_ENV));
        }
    }
    current()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn scoped_deny_blocks_and_restores() {
        std::env::remove_var(NETWORK_POLICY_ENV);
        let guard = NetworkPolicyGuard::deny("test deny");
        let err = check_outbound("https://api.openai.com/v1").unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Network);
        assert!(err.message.contains("outbound network blocked by policy"));
        assert!(err.message.contains("api.openai.com"));
        drop(guard);
        check_outbound("https://api.openai.com/v1").unwrap();
    }

    #[test]
    #[serial]
    fn env_deny_overrides_scoped_allow() {
        let previous = std::env::var(NETWORK_POLICY_ENV).ok();
        let _guard = NetworkPolicyGuard::set(NetworkPolicy::Allow);
        std::env::set_var(NETWORK_POLICY_ENV, "DENY");
        let err = check_outbound("https://example.com").unwrap_err();
        assert!(err.message.contains("CASCADE_NETWORK_POLICY=deny"));
        match previous {
            Some(v) => std::env::set_var(NETWORK_POLICY_ENV, v),
            None => std::env::remove_var(NETWORK_POLICY_ENV),
        }
    }

    #[test]
    #[serial]
    fn host_allowlist_matches_exact_host() {
        std::env::remove_var(NETWORK_POLICY_ENV);
        let _guard = NetworkPolicyGuard::allow_hosts(&["generativelanguage.googleapis.com"]);
        check_outbound("https://generativelanguage.googleapis.com/v1beta/models").unwrap();
        let err = check_outbound("https://api.openai.com/v1/chat/completions").unwrap_err();
        assert!(err.message.contains("not allowlisted"));
        assert!(check_outbound("not a url").is_err());
    }
}
