//! VagueRequestDetector (§4.8.2): flags under-specified objectives so the
//! planner can short-circuit to a single requirements-gathering agent.

const VERBS: &[&str] = &[
    "create", "build", "fix", "deploy", "write", "add", "update", "refactor", "design", "investigate",
    "validate", "test", "document", "optimize", "setup", "implement", "migrate", "remove", "improve",
];

const VAGUE_FILLERS: &[&str] = &["something", "stuff", "things", "whatever", "anything"];

#[derive(Debug, Clone)]
pub struct VagueVerdict {
    pub vagueness_score: f64,
    pub is_vague: bool,
}

/// §4.8.2 `VagueRequestDetector`.
pub fn check(objective: &str) -> VagueVerdict {
    let text = objective.to_lowercase();
    let word_count = text.split_whitespace().count();

    let has_verb = VERBS.iter().any(|v| text.contains(v));
    let has_filler = VAGUE_FILLERS.iter().any(|f| text.contains(f));
    let too_short = word_count < 3;

    let mut score = 0.0;
    if !has_verb {
        score += 0.4;
    }
    if has_filler {
        score += 0.4;
    }
    if too_short {
        score += 0.4;
    }
    if word_count < 6 {
        score += 0.1;
    }
    let vagueness_score = score.min(1.0);

    VagueVerdict {
        vagueness_score,
        is_vague: !has_verb || too_short || vagueness_score >= 0.7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_noun_only_objective_is_vague() {
        let verdict = check("the app");
        assert!(verdict.is_vague);
    }

    #[test]
    fn clear_objective_is_not_vague() {
        let verdict = check("Fix the broken login test in the auth module");
        assert!(!verdict.is_vague);
    }

    #[test]
    fn filler_words_raise_vagueness_score() {
        let verdict = check("do something with the stuff");
        assert!(verdict.vagueness_score >= 0.7);
    }
}
