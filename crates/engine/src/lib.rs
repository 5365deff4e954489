//! Consent banner detection and removal over any [`unbanner_dom::Document`].

pub mod classifier;
pub mod resolver;
pub mod scanner;
pub mod session;

pub use classifier::{Candidate, CandidateAction, ClassifierReport, Signal, classify, collect_candidates, score_element};
pub use resolver::{ResolverOutcome, find_container, resolve_known_provider};
pub use scanner::{ScanOutcome, scan_page, should_scan};
pub use session::{Lexicon, ScanSession, matches_pattern};
