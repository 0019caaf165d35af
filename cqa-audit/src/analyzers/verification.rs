//! Phase 4: Verification
//!
//! Checks documented claims against what the project actually contains.
//! Claims come from README sentences that promise something ("supports X",
//! "works with Y") and from the caller's domain context. A claim counts as
//! verified when one of its key terms shows up in the project's sources or in
//! output captured by the functionality phase.

use super::probe::{find_readme, read_text, ProjectTree};
use crate::models::{
    category, ClaimCheck, ClaimSource, PhaseFindings, RedFlag, Severity, VerificationFindings,
};
use crate::types::{PhaseAnalyzer, PhaseContext, PhaseError, PhaseId, PhaseOutput};
use crate::workflow::scoring::round_one_decimal;
use tracing::debug;

/// Phrases that mark a sentence as a claim
const CLAIM_MARKERS: &[&str] = &[
    "supports",
    "support for",
    "works with",
    "compatible with",
    "integrates with",
    "handles",
    "fast",
    "secure",
    "reliable",
];

const STOPWORDS: &[&str] = &[
    "with", "that", "this", "from", "into", "your", "their", "have", "also", "more", "than",
    "very", "most", "many", "such", "like", "well", "just", "only", "other", "which", "when",
    "will", "both", "each", "every", "without", "using", "uses", "about", "fully", "easily",
    "supports", "support", "works", "compatible", "integrates", "handles", "fast", "faster",
    "secure", "reliable", "blazing", "tool", "project", "data", "files",
];

/// Claims beyond this many are ignored
const MAX_CLAIMS: usize = 20;
const MIN_TERM_LEN: usize = 4;
const CLAIM_DISPLAY_CHARS: usize = 80;

/// Split README text into claim sentences
pub fn extract_claims(readme: &str) -> Vec<String> {
    let mut claims = Vec::new();
    let mut in_fence = false;

    for line in readme.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence || trimmed.starts_with('#') || trimmed.is_empty() {
            continue;
        }

        for sentence in trimmed.split_terminator(['.', '!', '?']) {
            let sentence = sentence.trim().trim_start_matches(['-', '*', ' ']).trim();
            let lower = sentence.to_ascii_lowercase();
            if CLAIM_MARKERS.iter().any(|m| lower.contains(m)) && !claims.iter().any(|c| c == sentence) {
                claims.push(sentence.to_string());
            }
        }
    }

    claims.truncate(MAX_CLAIMS);
    claims
}

/// Context items are separated by commas, semicolons or newlines
pub fn context_claims(context: &str) -> Vec<String> {
    context
        .split([',', ';', '\n'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Distinctive lowercase words of a claim
pub fn key_terms(claim: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in claim.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_')) {
        let word = word.trim_matches('-').to_ascii_lowercase();
        if word.chars().count() >= MIN_TERM_LEN
            && !STOPWORDS.contains(&word.as_str())
            && !terms.contains(&word)
        {
            terms.push(word);
        }
    }
    terms
}

fn short(claim: &str) -> String {
    if claim.chars().count() <= CLAIM_DISPLAY_CHARS {
        claim.to_string()
    } else {
        let cut: String = claim.chars().take(CLAIM_DISPLAY_CHARS).collect();
        format!("{}…", cut)
    }
}

/// Searchable lowercase text, each with the place it came from
struct Corpus {
    documents: Vec<(String, String)>,
}

impl Corpus {
    fn find(&self, term: &str) -> Option<&str> {
        self.documents
            .iter()
            .find(|(_, text)| text.contains(term))
            .map(|(origin, _)| origin.as_str())
    }

    fn check(&self, claim: String, source: ClaimSource) -> ClaimCheck {
        let terms = key_terms(&claim);
        let evidence = terms
            .iter()
            .find_map(|term| self.find(term).map(|origin| format!("'{}' found in {}", term, origin)));
        ClaimCheck {
            claim,
            source,
            verified: evidence.is_some(),
            evidence,
        }
    }
}

/// README claims checked against sources and phase 3 output
#[derive(Debug, Default)]
pub struct VerificationAnalyzer;

impl VerificationAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl PhaseAnalyzer for VerificationAnalyzer {
    fn phase(&self) -> PhaseId {
        PhaseId::Verification
    }

    async fn analyze(&self, ctx: &PhaseContext<'_>) -> Result<PhaseOutput, PhaseError> {
        let root = ctx.target_path.to_path_buf();
        let (readme, mut documents) = tokio::task::spawn_blocking(move || {
            let readme = find_readme(&root).and_then(|p| read_text(&p));
            let sources = ProjectTree::scan(&root).read_sources();
            (readme, sources)
        })
        .await
        .map_err(|e| PhaseError::Internal(format!("verification scan failed: {}", e)))?;

        for (_, text) in documents.iter_mut() {
            *text = text.to_lowercase();
        }
        if let Some(functionality) = ctx
            .prior_findings(PhaseId::Functionality)
            .and_then(|f| f.as_functionality())
        {
            for execution in &functionality.executions {
                let output = format!("{}\n{}", execution.stdout_excerpt, execution.stderr_excerpt);
                documents.push((format!("output of `{}`", execution.command), output.to_lowercase()));
            }
        }
        let corpus = Corpus { documents };

        let mut findings = VerificationFindings::default();
        let readme_claims = readme.as_deref().map(extract_claims).unwrap_or_default();
        for claim in readme_claims {
            findings.claims.push(corpus.check(claim, ClaimSource::Readme));
        }
        if let Some(context) = ctx.domain_context() {
            findings.context_used = true;
            for claim in context_claims(context) {
                findings.claims.push(corpus.check(claim, ClaimSource::Context));
            }
        }

        if !findings.claims.is_empty() {
            let verified = findings.claims.iter().filter(|c| c.verified).count();
            let ratio = verified as f64 / findings.claims.len() as f64;
            findings.score = Some(round_one_decimal(ratio * 10.0));
        }

        let source_count = corpus.documents.len();
        let unverified_flags: Vec<RedFlag> = findings
            .unverified()
            .map(|check| {
                let terms = key_terms(&check.claim);
                let evidence = if terms.is_empty() {
                    "claim names nothing concrete that could be checked".to_string()
                } else {
                    format!(
                        "none of [{}] found in {} searched document(s)",
                        terms.join(", "),
                        source_count
                    )
                };
                let origin = match check.source {
                    ClaimSource::Readme => "README",
                    ClaimSource::Context => "domain context",
                };
                RedFlag::new(
                    Severity::Low,
                    category::DATA_ACCURACY,
                    format!("Unverified claim: {}", short(&check.claim)),
                    format!("The {} claims \"{}\" but nothing in the project backs it up.", origin, check.claim),
                    "Back the claim with code, tests or an example, or remove it.",
                )
                .with_evidence(evidence)
            })
            .collect();
        findings.red_flags = unverified_flags;

        debug!(
            claims = findings.claims.len(),
            unverified = findings.red_flags.len(),
            score = ?findings.score,
            "Claims checked"
        );

        Ok(PhaseOutput::new(PhaseFindings::Verification(findings)))
    }
}
