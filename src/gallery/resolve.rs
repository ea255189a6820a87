use crate::gallery::cache::CachedPayload;
use crate::remote::{RemoteFile, RemoteStore};

/// Resolution strategies, in the fixed priority order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CachePayload,
    PublicReference,
    AuthenticatedFetch,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CachePayload => "cache-payload",
            Strategy::PublicReference => "public-reference",
            Strategy::AuthenticatedFetch => "authenticated-fetch",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Hit,
    Miss,
    Failed(String),
}

/// One step of the attempted-strategy trail, kept for diagnostics whether or
/// not a later strategy ends up producing the payload.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub strategy: Strategy,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub enum Payload {
    Cached { mime_type: String, bytes: Vec<u8> },
    Direct { reference: String },
    Fetched { mime_type: String, bytes: Vec<u8> },
}

/// Result of running the chain for one asset. `payload` is `None` when every
/// strategy was exhausted; callers render a placeholder and keep the trail.
#[derive(Debug)]
pub struct Resolution {
    pub payload: Option<Payload>,
    pub attempted: Vec<Attempt>,
}

/// Resolve one asset to a displayable payload.
///
/// Priority: existing cache entry, then the store's optimistic direct
/// reference, then an authenticated fetch when a bearer token is at hand.
/// Side-effect-free with respect to the cache — persisting a fetched payload
/// is the caller's decision.
pub fn resolve(
    file: &RemoteFile,
    cached: Option<&CachedPayload>,
    remote: Option<&dyn RemoteStore>,
    auth_token: Option<&str>,
) -> Resolution {
    let mut attempted = Vec::new();

    if let Some(entry) = cached {
        attempted.push(Attempt {
            strategy: Strategy::CachePayload,
            outcome: Outcome::Hit,
        });
        return Resolution {
            payload: Some(Payload::Cached {
                mime_type: entry.mime_type.clone(),
                bytes: entry.bytes.clone(),
            }),
            attempted,
        };
    }
    attempted.push(Attempt {
        strategy: Strategy::CachePayload,
        outcome: Outcome::Miss,
    });

    if let Some(reference) = remote.and_then(|r| r.public_reference(&file.id)) {
        attempted.push(Attempt {
            strategy: Strategy::PublicReference,
            outcome: Outcome::Hit,
        });
        return Resolution {
            payload: Some(Payload::Direct { reference }),
            attempted,
        };
    }
    attempted.push(Attempt {
        strategy: Strategy::PublicReference,
        outcome: Outcome::Miss,
    });

    match (remote, auth_token) {
        (Some(remote), Some(token)) => match remote.fetch_bytes(&file.id, Some(token)) {
            Ok(bytes) => {
                attempted.push(Attempt {
                    strategy: Strategy::AuthenticatedFetch,
                    outcome: Outcome::Hit,
                });
                return Resolution {
                    payload: Some(Payload::Fetched {
                        mime_type: file.mime_type.clone(),
                        bytes,
                    }),
                    attempted,
                };
            }
            Err(e) => attempted.push(Attempt {
                strategy: Strategy::AuthenticatedFetch,
                outcome: Outcome::Failed(e.to_string()),
            }),
        },
        _ => attempted.push(Attempt {
            strategy: Strategy::AuthenticatedFetch,
            outcome: Outcome::Miss,
        }),
    }

    Resolution {
        payload: None,
        attempted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;

    struct StubRemote {
        reference: Option<String>,
        bytes: Result<Vec<u8>, ()>,
    }

    impl RemoteStore for StubRemote {
        fn list(&self, _: Option<&str>) -> Result<Vec<RemoteFile>, RemoteError> {
            Ok(Vec::new())
        }
        fn rename(&self, _: &str, _: &str, _: &str) -> Result<(), RemoteError> {
            unreachable!("resolution never renames")
        }
        fn upload(&self, _: &[u8], _: &str, _: &str) -> Result<String, RemoteError> {
            unreachable!("resolution never uploads")
        }
        fn fetch_bytes(&self, _: &str, _: Option<&str>) -> Result<Vec<u8>, RemoteError> {
            self.bytes
                .clone()
                .map_err(|_| RemoteError::Io("fetch refused".into()))
        }
        fn public_reference(&self, _: &str) -> Option<String> {
            self.reference.clone()
        }
    }

    fn file() -> RemoteFile {
        RemoteFile {
            id: "a1".into(),
            name: "202510-01.jpg".into(),
            mime_type: "image/jpeg".into(),
            size: Some(3),
        }
    }

    fn cached() -> CachedPayload {
        CachedPayload {
            mime_type: "image/jpeg".into(),
            sha256: "aa".into(),
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn cache_entry_wins_without_touching_remote() {
        let res = resolve(&file(), Some(&cached()), None, None);
        assert!(matches!(res.payload, Some(Payload::Cached { .. })));
        assert_eq!(res.attempted.len(), 1);
        assert_eq!(res.attempted[0].strategy, Strategy::CachePayload);
        assert_eq!(res.attempted[0].outcome, Outcome::Hit);
    }

    #[test]
    fn direct_reference_is_second_choice() {
        let remote = StubRemote {
            reference: Some("https://cdn.example/202510-01.jpg".into()),
            bytes: Err(()),
        };
        let res = resolve(&file(), None, Some(&remote), Some("token"));
        match res.payload {
            Some(Payload::Direct { reference }) => {
                assert!(reference.ends_with("202510-01.jpg"))
            }
            other => panic!("expected direct reference, got {:?}", other),
        }
        assert_eq!(res.attempted.len(), 2);
    }

    #[test]
    fn authenticated_fetch_used_when_store_is_private() {
        let remote = StubRemote {
            reference: None,
            bytes: Ok(vec![9, 9]),
        };
        let res = resolve(&file(), None, Some(&remote), Some("token"));
        assert!(matches!(res.payload, Some(Payload::Fetched { .. })));
        assert_eq!(res.attempted.len(), 3);
    }

    #[test]
    fn exhausted_chain_keeps_full_trail() {
        let remote = StubRemote {
            reference: None,
            bytes: Err(()),
        };
        let res = resolve(&file(), None, Some(&remote), Some("token"));
        assert!(res.payload.is_none());
        assert_eq!(res.attempted.len(), 3);
        assert!(matches!(res.attempted[2].outcome, Outcome::Failed(_)));

        // no token at all: fetch is recorded as skipped, not failed
        let res = resolve(&file(), None, Some(&remote), None);
        assert!(res.payload.is_none());
        assert_eq!(res.attempted[2].outcome, Outcome::Miss);
    }
}
