//! Privacy & Safety Gate (C4): PHI scan with a medical-terminology
//! allowlist, emergency-keyword detection, and disclaimer generation.

use regex::Regex;
use std::sync::OnceLock;

/// How the gate reacts to detected PHI (§6 `safety.mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyMode {
    ZeroTolerance,
    Redact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhiKind {
    GovernmentId,
    Phone,
    Email,
    MedicalRecordNumber,
    DateOfBirth,
    Address,
    Extended,
}

#[derive(Debug, Clone)]
pub struct PhiSpan {
    pub start: usize,
    pub end: usize,
    pub kind: PhiKind,
}

#[derive(Debug, Clone)]
pub struct ScanResult {
    pub phi_found: bool,
    pub spans: Vec<PhiSpan>,
    pub safe_to_log: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyCategory {
    Cardiac,
    Respiratory,
    Neurological,
    Trauma,
    Anaphylactic,
    Toxicological,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
}

#[derive(Debug, Clone, Copy)]
pub struct EmergencyDetected {
    pub category: EmergencyCategory,
    pub severity: Severity,
}

/// Curated terms that, inside or adjacent to a PHI-shaped span, indicate
/// the span is medical terminology or publication metadata, not an
/// identifier (§4.4). Publication metadata (authors, journals, DOIs) is
/// never PHI regardless of allowlist match.
fn allowlist_terms() -> &'static [&'static str] {
    &[
        "diagnosis", "prognosis", "treatment", "therapy", "dosage", "mg", "ml",
        "hypertension", "diabetes", "mellitus", "cardiac", "renal", "hepatic",
        "contraindication", "interaction", "inhibitor", "monograph", "doi",
        "pmid", "journal", "clinical trial", "guideline", "syndrome", "fracture",
    ]
}

fn government_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b").unwrap())
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[\w.+-]+@[\w-]+\.[\w.-]+\b").unwrap())
}

fn mrn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bMRN[:\s#-]*\d{5,}\b").unwrap())
}

fn dob_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b").unwrap())
}

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b\d{1,5}\s+[A-Za-z0-9.\s]{2,30}\b(?:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln)\b").unwrap()
    })
}

pub struct SafetyGate {
    mode: SafetyMode,
    extended_phi: Vec<Regex>,
}

impl SafetyGate {
    pub fn new(mode: SafetyMode, extended_phi_patterns: &[String]) -> Self {
        let extended_phi = extended_phi_patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self { mode, extended_phi }
    }

    /// Only date-of-birth and street-address spans are ambiguous enough to
    /// need a context check (a publication date or a dosage figure can look
    /// like one); government IDs, phone numbers, emails, and MRNs are
    /// unambiguous identifier shapes and are never allowlisted regardless
    /// of surrounding text.
    fn is_allowlisted(text: &str, span: &PhiSpan) -> bool {
        if !matches!(span.kind, PhiKind::DateOfBirth | PhiKind::Address) {
            return false;
        }
        let window_start = span.start.saturating_sub(15);
        let window_end = (span.end + 15).min(text.len());
        let Some(window) = text.get(window_start..window_end) else {
            return false;
        };
        let lower = window.to_lowercase();
        allowlist_terms().iter().any(|term| lower.contains(term))
    }

    /// Scan `text` for PHI-shaped spans, filtering out spans inside a
    /// medical-terminology or publication-metadata context (§4.4).
    pub fn scan(&self, text: &str) -> ScanResult {
        let mut raw_spans = Vec::new();

        for (re, kind) in [
            (government_id_re(), PhiKind::GovernmentId),
            (phone_re(), PhiKind::Phone),
            (email_re(), PhiKind::Email),
            (mrn_re(), PhiKind::MedicalRecordNumber),
            (dob_re(), PhiKind::DateOfBirth),
            (address_re(), PhiKind::Address),
        ] {
            for m in re.find_iter(text) {
                raw_spans.push(PhiSpan {
                    start: m.start(),
                    end: m.end(),
                    kind,
                });
            }
        }
        for re in &self.extended_phi {
            for m in re.find_iter(text) {
                raw_spans.push(PhiSpan {
                    start: m.start(),
                    end: m.end(),
                    kind: PhiKind::Extended,
                });
            }
        }

        let spans: Vec<PhiSpan> = raw_spans
            .into_iter()
            .filter(|span| !Self::is_allowlisted(text, span))
            .collect();

        let phi_found = !spans.is_empty();
        ScanResult {
            phi_found,
            safe_to_log: !phi_found,
            spans,
        }
    }

    pub fn mode(&self) -> SafetyMode {
        self.mode
    }

    /// True when the configured policy requires rejecting `scan`'s input
    /// outright rather than redacting it.
    pub fn should_reject(&self, scan: &ScanResult) -> bool {
        self.mode == SafetyMode::ZeroTolerance && scan.phi_found
    }

    /// Replace each PHI span with a category tag, for any text destined for
    /// logs, metrics, or the local LLM (§4.4).
    pub fn redact(&self, text: &str, scan: &ScanResult) -> String {
        if scan.spans.is_empty() {
            return text.to_string();
        }
        let mut spans = scan.spans.clone();
        spans.sort_by_key(|s| s.start);

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0usize;
        for span in spans {
            if span.start < cursor {
                continue;
            }
            out.push_str(&text[cursor..span.start]);
            out.push_str(&format!("[REDACTED:{}]", phi_kind_tag(span.kind)));
            cursor = span.end;
        }
        out.push_str(&text[cursor..]);
        out
    }

    /// Substring match against categorized emergency keyword lists,
    /// case-insensitive, against the *original* query text (§4.4).
    pub fn detect_emergency(&self, text: &str) -> Option<EmergencyDetected> {
        let lower = text.to_lowercase();
        let categories: &[(EmergencyCategory, &[&str])] = &[
            (EmergencyCategory::Cardiac, &["chest pain", "crushing chest", "heart attack", "cardiac arrest"]),
            (EmergencyCategory::Respiratory, &["can't breathe", "cannot breathe", "shortness of breath", "choking"]),
            (EmergencyCategory::Neurological, &["stroke", "facial droop", "slurred speech", "seizure"]),
            (EmergencyCategory::Trauma, &["severe bleeding", "head trauma", "unconscious", "not breathing"]),
            (EmergencyCategory::Anaphylactic, &["anaphylaxis", "throat closing", "severe allergic reaction"]),
            (EmergencyCategory::Toxicological, &["overdose", "poisoning", "ingested poison"]),
        ];

        for (category, keywords) in categories {
            if keywords.iter().any(|kw| lower.contains(kw)) {
                return Some(EmergencyDetected {
                    category: *category,
                    severity: Severity::Critical,
                });
            }
        }
        None
    }

    /// Build a disclaimer string parameterized by the given facets (§4.4).
    /// Always appended to any response carrying medical content.
    pub fn disclaimer(&self, specialty: Option<&str>, urgency: Option<&str>, interaction_type: Option<&str>) -> String {
        let mut parts = vec![
            "This information is for general educational purposes and does not constitute medical advice.".to_string(),
        ];
        if let Some(specialty) = specialty {
            parts.push(format!("Consult a qualified {specialty} professional for guidance specific to your situation."));
        } else {
            parts.push("Consult a qualified healthcare professional for guidance specific to your situation.".to_string());
        }
        if let Some(urgency) = urgency {
            parts.push(format!("Urgency: {urgency}."));
        }
        if let Some(interaction_type) = interaction_type {
            parts.push(format!("This covers {interaction_type} only and may not be exhaustive."));
        }
        parts.join(" ")
    }

    pub fn emergency_response(&self, detected: EmergencyDetected) -> String {
        format!(
            "This appears to be a {} emergency. Call your local emergency number immediately or go to the nearest emergency department. {}",
            emergency_category_label(detected.category),
            self.disclaimer(None, Some("immediate"), None)
        )
    }
}

fn phi_kind_tag(kind: PhiKind) -> &'static str {
    match kind {
        PhiKind::GovernmentId => "GOVERNMENT_ID",
        PhiKind::Phone => "PHONE",
        PhiKind::Email => "EMAIL",
        PhiKind::MedicalRecordNumber => "MRN",
        PhiKind::DateOfBirth => "DOB",
        PhiKind::Address => "ADDRESS",
        PhiKind::Extended => "EXTENDED",
    }
}

fn emergency_category_label(category: EmergencyCategory) -> &'static str {
    match category {
        EmergencyCategory::Cardiac => "cardiac",
        EmergencyCategory::Respiratory => "respiratory",
        EmergencyCategory::Neurological => "neurological",
        EmergencyCategory::Trauma => "trauma",
        EmergencyCategory::Anaphylactic => "anaphylactic",
        EmergencyCategory::Toxicological => "toxicological",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_ssn_as_phi() {
        let gate = SafetyGate::new(SafetyMode::ZeroTolerance, &[]);
        let scan = gate.scan("Patient SSN 123-45-6789 regarding hypertension");
        assert!(scan.phi_found);
        assert!(gate.should_reject(&scan));
    }

    #[test]
    fn medical_terminology_is_not_phi() {
        let gate = SafetyGate::new(SafetyMode::ZeroTolerance, &[]);
        let scan = gate.scan("What are the contraindications for metformin in renal impairment?");
        assert!(!scan.phi_found);
    }

    #[test]
    fn doi_like_metadata_is_not_flagged() {
        let gate = SafetyGate::new(SafetyMode::ZeroTolerance, &[]);
        let scan = gate.scan("See doi 10.1001/jama.2020.1234 in the journal for details");
        assert!(!scan.phi_found);
    }

    #[test]
    fn redact_replaces_spans_with_category_tags() {
        let gate = SafetyGate::new(SafetyMode::Redact, &[]);
        let text = "Contact me at jane.doe@example.com about this";
        let scan = gate.scan(text);
        let redacted = gate.redact(text, &scan);
        assert!(redacted.contains("[REDACTED:EMAIL]"));
        assert!(!redacted.contains("jane.doe@example.com"));
    }

    #[test]
    fn emergency_keyword_is_detected_case_insensitively() {
        let gate = SafetyGate::new(SafetyMode::Redact, &[]);
        let detected = gate.detect_emergency("Crushing CHEST PAIN and shortness of breath, what should I do?");
        assert!(matches!(detected, Some(EmergencyDetected { category: EmergencyCategory::Cardiac, .. })));
    }

    #[test]
    fn non_emergency_query_returns_none() {
        let gate = SafetyGate::new(SafetyMode::Redact, &[]);
        assert!(gate.detect_emergency("What does recent literature say about SGLT2 inhibitors?").is_none());
    }

    #[test]
    fn disclaimer_always_non_empty() {
        let gate = SafetyGate::new(SafetyMode::Redact, &[]);
        assert!(!gate.disclaimer(None, None, None).is_empty());
    }
}
