// Checks over the quiz content shipped with the crate

use quiz_funnel::models::{Language, Platform};
use quiz_funnel::services::content_registry::ContentRegistry;

const LANGUAGES: [&str; 5] = ["uk", "ru", "en", "pl", "de"];

#[test]
fn test_every_quiz_resolves_in_every_language() {
    let registry = ContentRegistry::builtin().unwrap();
    assert_eq!(registry.len(), 10);

    for quiz_id in registry.quiz_ids() {
        for code in LANGUAGES {
            let quiz = registry
                .resolve(quiz_id, code)
                .found()
                .unwrap_or_else(|| panic!("{} missing in {}", quiz_id, code));
            assert_eq!(quiz.language.as_str(), code);
            assert!(!quiz.fell_back);
            assert!(quiz.question_count() > 0, "{} ({}) is empty", quiz_id, code);
            assert_eq!(quiz.total_steps(), quiz.question_count() + 1);
            assert!(!quiz.content.title.trim().is_empty());
            for question in &quiz.content.questions {
                assert!(
                    !question.options.is_empty(),
                    "{} ({}) '{}' has no options",
                    quiz_id,
                    code,
                    question.question
                );
            }
        }
    }
}

#[test]
fn test_translations_keep_the_question_shape() {
    let registry = ContentRegistry::builtin().unwrap();

    for quiz_id in registry.quiz_ids() {
        let english = registry.get(quiz_id, Language::En).unwrap();
        for code in LANGUAGES {
            let quiz = registry.resolve(quiz_id, code).found().unwrap();
            assert_eq!(
                quiz.question_count(),
                english.questions.len(),
                "{} ({}) question count differs from English",
                quiz_id,
                code
            );
        }
    }
}

#[test]
fn test_catalog_covers_both_platforms() {
    let registry = ContentRegistry::builtin().unwrap();
    let summaries: Vec<_> = registry.summaries().collect();

    let meta = summaries
        .iter()
        .filter(|s| s.platform == Platform::Meta)
        .count();
    let google = summaries
        .iter()
        .filter(|s| s.platform == Platform::Google)
        .count();
    assert_eq!(meta, 5);
    assert_eq!(google, 5);
    assert!(summaries
        .iter()
        .all(|s| s.languages.len() == LANGUAGES.len()));
}

#[test]
fn test_unknown_codes_fall_back_to_english() {
    let registry = ContentRegistry::builtin().unwrap();

    for code in ["fr", "", "EN-us", "zz"] {
        let quiz = registry.resolve("google-ecom", code).found().unwrap();
        assert_eq!(quiz.language, Language::En);
    }
    assert!(!registry.resolve("google-ecom ", "en").is_found());
}
