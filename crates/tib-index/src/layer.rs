//! Architectural layer inference from repository-relative paths.

/// Layer assigned when no pattern matches.
pub const DEFAULT_LAYER: &str = "other";

/// Ordered `(path substring, layer)` table; the first match wins.
const LAYER_PATTERNS: &[(&str, &str)] = &[
    ("/test/", "test"),
    ("/tests/", "test"),
    ("/__tests__/", "test"),
    ("/spec/", "test"),
    ("/controller/", "controller"),
    ("/controllers/", "controller"),
    ("/routes/", "controller"),
    ("/handler/", "controller"),
    ("/handlers/", "controller"),
    ("/service/", "service"),
    ("/services/", "service"),
    ("/repository/", "repository"),
    ("/repositories/", "repository"),
    ("/dao/", "repository"),
    ("/entity/", "model"),
    ("/entities/", "model"),
    ("/model/", "model"),
    ("/models/", "model"),
    ("/domain/", "model"),
    ("/dto/", "dto"),
    ("/migration/", "migration"),
    ("/migrations/", "migration"),
    ("/middleware/", "middleware"),
    ("/components/", "component"),
    ("/component/", "component"),
    ("/pages/", "page"),
    ("/views/", "page"),
    ("/store/", "store"),
    ("/stores/", "store"),
    ("/util/", "util"),
    ("/utils/", "util"),
    ("/helpers/", "util"),
    ("/docs/", "docs"),
];

/// Infer the architectural layer of `file_path`, defaulting to [`DEFAULT_LAYER`].
#[must_use]
pub fn infer_layer(file_path: &str) -> &'static str {
    let normalized = format!("/{}", file_path.replace('\\', "/").to_lowercase());
    LAYER_PATTERNS
        .iter()
        .find(|(pattern, _)| normalized.contains(pattern))
        .map_or(DEFAULT_LAYER, |(_, layer)| layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_path() {
        assert_eq!(
            infer_layer("src/main/java/com/acme/controller/PaymentController.java"),
            "controller"
        );
    }

    #[test]
    fn first_match_wins() {
        assert_eq!(infer_layer("src/test/java/service/PaymentServiceTest.java"), "test");
    }

    #[test]
    fn top_level_directory_matches() {
        assert_eq!(infer_layer("services/payment.ts"), "service");
    }

    #[test]
    fn case_and_separator_insensitive() {
        assert_eq!(infer_layer("src\\Repository\\UserRepo.java"), "repository");
    }

    #[test]
    fn unmatched_defaults_to_other() {
        assert_eq!(infer_layer("src/main.rs"), DEFAULT_LAYER);
        assert_eq!(infer_layer("controllerish/file.ts"), DEFAULT_LAYER);
    }
}
