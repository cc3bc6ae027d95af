//! Identifier resolution for data sources addressed by id or by name.
//!
//! # Design
//! Resolution works on a snapshot of the whole collection: there is no
//! server-side filter by name, and nothing is cached between resolutions.
//! An exact, case-sensitive match wins outright. Otherwise the query is
//! ranked against every valid identifier (case-folded subsequence filter,
//! then Levenshtein distance) and the error carries the closest few when
//! there are few enough to be useful, plus the complete list of valid
//! values so the operator can correct the configuration without querying
//! the service again.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use strsim::levenshtein;
use tracing::debug;

use crate::error::{QueryKind, ReconcileError, ReconcileResult};
use crate::model::LocalObject;

/// Upper bound on the suggestion list carried by a `NotFound` error.
pub const MAX_SUGGESTIONS: usize = 5;

/// How a data source is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionQuery {
    ById(String),
    ByName(String),
}

impl ResolutionQuery {
    pub fn kind(&self) -> QueryKind {
        match self {
            ResolutionQuery::ById(_) => QueryKind::Id,
            ResolutionQuery::ByName(_) => QueryKind::Name,
        }
    }

    pub fn input(&self) -> &str {
        match self {
            ResolutionQuery::ById(s) | ResolutionQuery::ByName(s) => s,
        }
    }

    /// Read the query from a data source configuration, where exactly one of
    /// `id_attr` and `name_attr` is set.
    pub fn from_config(config: &LocalObject, id_attr: &str, name_attr: &str) -> ReconcileResult<Self> {
        match (config.get(id_attr).known_str(), config.get(name_attr).known_str()) {
            (Some(id), None) => Ok(ResolutionQuery::ById(id.to_string())),
            (None, Some(name)) => Ok(ResolutionQuery::ByName(name.to_string())),
            _ => Err(ReconcileError::construction(
                id_attr,
                format!("exactly one of `{id_attr}` or `{name_attr}` must be set"),
            )),
        }
    }
}

/// One remote object that a query may resolve to.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub document: Value,
}

impl Candidate {
    /// Extract the id and the `name_key` property from a collection member.
    pub fn from_document(document: Value, name_key: &str) -> ReconcileResult<Self> {
        let field = |key: &str| {
            document
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    ReconcileError::Deserialization(format!("collection member has no string `{key}`"))
                })
        };
        let id = field("id")?;
        let name = field(name_key)?;
        Ok(Self { id, name, document })
    }

    fn key(&self, kind: QueryKind) -> &str {
        match kind {
            QueryKind::Id => &self.id,
            QueryKind::Name => &self.name,
        }
    }
}

/// Find the unique candidate matching `query`.
pub fn resolve<'a>(
    resource: &str,
    query: &ResolutionQuery,
    candidates: &'a [Candidate],
) -> ReconcileResult<&'a Candidate> {
    if candidates.is_empty() {
        return Err(ReconcileError::NoCandidates {
            resource: resource.to_string(),
        });
    }

    let kind = query.kind();
    let mut index: HashMap<&str, Vec<&'a Candidate>> = HashMap::with_capacity(candidates.len());
    for candidate in candidates {
        index.entry(candidate.key(kind)).or_default().push(candidate);
    }

    match index.get(query.input()).map(Vec::as_slice) {
        Some([only]) => {
            debug!(resource, kind = kind.label(), id = %only.id, "resolved exact match");
            Ok(only)
        }
        Some(many) => Err(ReconcileError::Ambiguous {
            resource: resource.to_string(),
            input: query.input().to_string(),
            ids: many.iter().map(|c| c.id.clone()).collect(),
        }),
        None => {
            let valid: Vec<String> = index
                .keys()
                .map(|k| k.to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let ranked = rank_matches(query.input(), &valid);
            debug!(
                resource,
                kind = kind.label(),
                input = query.input(),
                close_matches = ranked.len(),
                "no exact match"
            );
            let suggestions = if (1..=MAX_SUGGESTIONS).contains(&ranked.len()) {
                ranked
            } else {
                Vec::new()
            };
            Err(ReconcileError::NotFound {
                resource: resource.to_string(),
                kind,
                input: query.input().to_string(),
                suggestions,
                valid,
                attribute: None,
            })
        }
    }
}

/// Rank `targets` by closeness to `query`.
///
/// A target qualifies when the case-folded query is a subsequence of the
/// case-folded target; qualifying targets are ordered by edit distance,
/// then by the target itself.
pub fn rank_matches(query: &str, targets: &[String]) -> Vec<String> {
    let folded_query = query.to_lowercase();
    let mut ranked: Vec<(usize, &str)> = targets
        .iter()
        .filter_map(|target| {
            let folded = target.to_lowercase();
            is_subsequence(&folded_query, &folded)
                .then(|| (levenshtein(&folded_query, &folded), target.as_str()))
        })
        .collect();
    ranked.sort_unstable();
    ranked.into_iter().map(|(_, target)| target.to_string()).collect()
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut hay = haystack.chars();
    needle.chars().all(|c| hay.any(|h| h == c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attr;
    use serde_json::json;

    fn candidate(id: &str, name: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            name: name.to_string(),
            document: json!({ "id": id, "name": name }),
        }
    }

    fn catalogue() -> Vec<Candidate> {
        vec![
            candidate("c7503427-338e-4c5e-902d-abe252abfde4", "Require multifactor authentication for admins"),
            candidate("a3d0a415-b068-4326-9251-f9cdf9feeb64", "Require multifactor authentication for all users"),
            candidate("0b2282f9-2862-4178-88b5-d79340b36cb8", "Block legacy authentication"),
            candidate("b8bda7f8-6584-4446-bce9-d871480e53fa", "Securing security info registration"),
        ]
    }

    #[test]
    fn exact_name_match_is_found() {
        let candidates = catalogue();
        let found = resolve(
            "template",
            &ResolutionQuery::ByName("Block legacy authentication".into()),
            &candidates,
        )
        .unwrap();
        assert_eq!(found.id, "0b2282f9-2862-4178-88b5-d79340b36cb8");
    }

    #[test]
    fn exact_id_match_is_found() {
        let candidates = catalogue();
        let found = resolve(
            "template",
            &ResolutionQuery::ById("b8bda7f8-6584-4446-bce9-d871480e53fa".into()),
            &candidates,
        )
        .unwrap();
        assert_eq!(found.name, "Securing security info registration");
    }

    #[test]
    fn matching_is_case_sensitive() {
        let candidates = catalogue();
        let err = resolve(
            "template",
            &ResolutionQuery::ByName("block legacy authentication".into()),
            &candidates,
        )
        .unwrap_err();
        match err {
            ReconcileError::NotFound { suggestions, .. } => {
                assert_eq!(suggestions, vec!["Block legacy authentication"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn abbreviated_name_suggests_the_intended_candidate() {
        let candidates = catalogue();
        let err = resolve(
            "template",
            &ResolutionQuery::ByName("Require MFA for admin".into()),
            &candidates,
        )
        .unwrap_err();
        match err {
            ReconcileError::NotFound {
                kind,
                input,
                suggestions,
                valid,
                ..
            } => {
                assert_eq!(kind, QueryKind::Name);
                assert_eq!(input, "Require MFA for admin");
                assert_eq!(suggestions, vec!["Require multifactor authentication for admins"]);
                assert_eq!(valid.len(), 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn too_many_close_matches_drop_suggestions() {
        let candidates: Vec<Candidate> = (0..7)
            .map(|i| candidate(&format!("id-{i}"), &format!("Require policy {i}")))
            .collect();
        let err = resolve("template", &ResolutionQuery::ByName("Require".into()), &candidates).unwrap_err();
        match err {
            ReconcileError::NotFound { suggestions, valid, .. } => {
                assert!(suggestions.is_empty());
                assert_eq!(valid.len(), 7);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unrelated_query_has_no_suggestions_but_lists_valid_ids() {
        let candidates = catalogue();
        let err = resolve("template", &ResolutionQuery::ById("zzz".into()), &candidates).unwrap_err();
        match err {
            ReconcileError::NotFound { kind, suggestions, valid, .. } => {
                assert_eq!(kind, QueryKind::Id);
                assert!(suggestions.is_empty());
                assert!(valid.contains(&"0b2282f9-2862-4178-88b5-d79340b36cb8".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_names_are_ambiguous() {
        let mut candidates = catalogue();
        candidates.push(candidate("dup", "Block legacy authentication"));
        let err = resolve(
            "policy",
            &ResolutionQuery::ByName("Block legacy authentication".into()),
            &candidates,
        )
        .unwrap_err();
        match err {
            ReconcileError::Ambiguous { ids, .. } => assert_eq!(ids.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_candidate_set_fails() {
        let err = resolve("template", &ResolutionQuery::ById("x".into()), &[]).unwrap_err();
        assert!(matches!(err, ReconcileError::NoCandidates { .. }));
    }

    #[test]
    fn resolution_is_deterministic() {
        let candidates = catalogue();
        let query = ResolutionQuery::ByName("Require multifactor".into());
        let first = resolve("template", &query, &candidates).unwrap_err().to_string();
        for _ in 0..10 {
            assert_eq!(resolve("template", &query, &candidates).unwrap_err().to_string(), first);
        }
        let targets: Vec<String> = candidates.iter().map(|c| c.name.clone()).collect();
        assert_eq!(
            rank_matches("Require multifactor", &targets),
            vec![
                "Require multifactor authentication for admins",
                "Require multifactor authentication for all users",
            ]
        );
    }

    #[test]
    fn ranking_orders_by_distance() {
        let targets = vec!["abcdef".to_string(), "abc".to_string(), "xaxbxc".to_string()];
        assert_eq!(rank_matches("abc", &targets), vec!["abc", "abcdef", "xaxbxc"]);
    }

    #[test]
    fn query_from_config_requires_exactly_one_key() {
        let by_name = LocalObject::new().with("display_name", Attr::string("x"));
        assert_eq!(
            ResolutionQuery::from_config(&by_name, "id", "display_name").unwrap(),
            ResolutionQuery::ByName("x".into())
        );
        let both = by_name.clone().with("id", Attr::string("1"));
        assert!(ResolutionQuery::from_config(&both, "id", "display_name").is_err());
        assert!(ResolutionQuery::from_config(&LocalObject::new(), "id", "display_name").is_err());
    }

    #[test]
    fn candidate_requires_id_and_name() {
        let ok = Candidate::from_document(json!({ "id": "1", "displayName": "x" }), "displayName").unwrap();
        assert_eq!(ok.name, "x");
        assert!(Candidate::from_document(json!({ "id": "1" }), "displayName").is_err());
    }
}
