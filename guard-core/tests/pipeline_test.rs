/// Integration tests for the validation pipeline

#[cfg(test)]
mod tests {
    use guard_core::security::{
        AllowedCharset, CharRange, ForbiddenRule, Rejection, ResolutionFailure, ScanStage,
    };
    use guard_core::{PipelineConfig, SharedPipeline, ValidationPipeline, Verdict};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// `<tmp>/home/user` as trusted root, with `<tmp>/System` beside it.
    struct Fixture {
        _tmp: TempDir,
        root: PathBuf,
        pipeline: ValidationPipeline,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("home").join("user");
        fs::create_dir_all(root.join("test")).unwrap();
        fs::create_dir_all(tmp.path().join("System")).unwrap();

        let config = PipelineConfig::new(
            vec![
                ForbiddenRule::literal("script-open", "<script>"),
                ForbiddenRule::regex("event-handler", r"on[a-z]+\s*=").case_insensitive(),
            ],
            AllowedCharset::PrintableAscii,
            &root,
        )
        .unwrap();

        Fixture {
            root: config.trusted_root().as_path().to_path_buf(),
            pipeline: ValidationPipeline::new(config),
            _tmp: tmp,
        }
    }

    fn blacklist_stage<T>(verdict: &Verdict<T>) -> Option<ScanStage> {
        match verdict.rejection() {
            Some(Rejection::BlacklistViolation(v)) => Some(v.stage),
            _ => None,
        }
    }

    #[test]
    fn test_equivalent_forms_of_angle_brackets_are_rejected() {
        let f = fixture();
        for input in [
            "\u{FE64}script\u{FE65}",
            "\u{FF1C}script\u{FF1E}",
            "<\u{FF53}\u{FF43}\u{FF52}\u{FF49}\u{FF50}\u{FF54}>",
        ] {
            let verdict = f.pipeline.validate_text(input);
            assert_eq!(blacklist_stage(&verdict), Some(ScanStage::Normalized), "{input:?}");
        }
    }

    #[test]
    fn test_noncharacter_split_tag_is_rejected_after_sanitizing() {
        let f = fixture();
        let verdict = f.pipeline.validate_text("<scr\u{FDEF}ipt>");
        assert_eq!(blacklist_stage(&verdict), Some(ScanStage::Sanitized));

        let verdict = f.pipeline.validate_text("<img on\u{200B}load=x>");
        assert_eq!(blacklist_stage(&verdict), Some(ScanStage::Sanitized));
    }

    #[test]
    fn test_composition_exposed_by_stripping_is_rejected() {
        let f = fixture();
        let config = PipelineConfig::new(
            vec![ForbiddenRule::literal("cafe-accent", "caf\u{00E9}")],
            AllowedCharset::Ranges {
                ranges: vec![
                    CharRange { start: ' ', end: '~' },
                    CharRange { start: '\u{0300}', end: '\u{036F}' },
                ],
            },
            &f.root,
        )
        .unwrap();
        let pipeline = ValidationPipeline::new(config);

        // The noncharacter keeps the accent from composing until it is stripped.
        let verdict = pipeline.validate_text("cafe\u{FDEF}\u{0301}");
        assert_eq!(blacklist_stage(&verdict), Some(ScanStage::Sanitized));

        let text = pipeline.validate_text("cafe\u{FDEF}\u{0301}s").rejection().cloned();
        assert!(matches!(text, Some(Rejection::BlacklistViolation(v)) if v.rule_id == "cafe-accent"));
    }

    #[test]
    fn test_accepted_text_is_sanitized_output() {
        let f = fixture();
        let text = f
            .pipeline
            .validate_text("caf\u{00E9} \u{FB01}le\u{0007}")
            .accepted()
            .unwrap();
        assert_eq!(text.as_str(), "caf file");
    }

    #[test]
    fn test_text_bytes() {
        let f = fixture();
        assert!(f.pipeline.validate_text_bytes(b"plain").is_accepted());
        assert!(matches!(
            f.pipeline.validate_text_bytes(&[0x3c, 0xff, 0x3e]),
            Verdict::Reject(Rejection::Encoding(e)) if e.valid_up_to == 1
        ));
        assert_eq!(
            blacklist_stage(&f.pipeline.validate_text_bytes("\u{FE64}script\u{FE65}".as_bytes())),
            Some(ScanStage::Normalized)
        );
    }

    #[test]
    fn test_path_inside_root_is_accepted() {
        let f = fixture();
        let path = f.pipeline.validate_path("test").accepted().unwrap();
        assert_eq!(path.as_path(), f.root.join("test"));
    }

    #[test]
    fn test_empty_fragment_is_the_root() {
        let f = fixture();
        let path = f.pipeline.validate_path("").accepted().unwrap();
        assert_eq!(path.as_path(), f.root.as_path());
    }

    #[test]
    fn test_dot_dot_escape_is_traversal_not_resolution() {
        let f = fixture();

        // Lexically the joined path still starts with the root.
        let lexical = f.root.join("../../System");
        assert!(lexical.starts_with(&f.root));

        match f.pipeline.validate_path("../../System") {
            Verdict::Reject(Rejection::Traversal(err)) => {
                assert!(!err.resolved.starts_with(&f.root));
                assert!(err.resolved.ends_with("System"));
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
    }

    #[test]
    fn test_dot_dot_that_stays_inside_is_accepted() {
        let f = fixture();
        let path = f.pipeline.validate_path("test/../test/.").accepted().unwrap();
        assert_eq!(path.as_path(), f.root.join("test"));
    }

    #[test]
    fn test_sibling_with_common_prefix_is_traversal() {
        let f = fixture();
        fs::create_dir_all(f.root.parent().unwrap().join("user2")).unwrap();
        let verdict = f.pipeline.validate_path("../user2");
        assert_eq!(verdict.rejection().map(Rejection::kind), Some("traversal"));
    }

    #[test]
    fn test_absolute_fragment_outside_root_is_traversal() {
        let f = fixture();
        let outside = f.root.parent().unwrap().parent().unwrap().join("System");
        let verdict = f.pipeline.validate_path(outside.to_str().unwrap());
        assert_eq!(verdict.rejection().map(Rejection::kind), Some("traversal"));
    }

    #[test]
    fn test_missing_target_is_resolution_error() {
        let f = fixture();
        match f.pipeline.validate_path("does/not/exist") {
            Verdict::Reject(Rejection::Resolution(err)) => {
                assert_eq!(err.failure, ResolutionFailure::NotFound);
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_traversal() {
        let f = fixture();
        let outside = f.root.parent().unwrap().parent().unwrap().join("System");
        std::os::unix::fs::symlink(&outside, f.root.join("shortcut")).unwrap();

        let verdict = f.pipeline.validate_path("shortcut");
        assert_eq!(verdict.rejection().map(Rejection::kind), Some("traversal"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_within_root_is_accepted_as_target() {
        let f = fixture();
        std::os::unix::fs::symlink(f.root.join("test"), f.root.join("alias")).unwrap();

        let path = f.pipeline.validate_path("alias").accepted().unwrap();
        assert_eq!(path.as_path(), f.root.join("test"));
    }

    #[test]
    fn test_new_path_then_confirm() {
        let f = fixture();
        let provisional = f
            .pipeline
            .validate_new_path("test/reports/q1.txt")
            .accepted()
            .unwrap();
        assert_eq!(provisional.as_path(), f.root.join("test/reports/q1.txt"));
        assert!(!provisional.exists());

        fs::create_dir_all(f.root.join("test/reports")).unwrap();
        fs::write(provisional.as_path(), "data").unwrap();

        let confirmed = provisional.confirm(&f.pipeline).accepted().unwrap();
        assert_eq!(confirmed.as_path(), f.root.join("test/reports/q1.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_confirm_resolves_the_provisional_path() {
        let f = fixture();
        fs::create_dir_all(f.root.join("test/deep")).unwrap();
        std::os::unix::fs::symlink(f.root.join("test/deep"), f.root.join("link")).unwrap();

        let provisional = f
            .pipeline
            .validate_new_path("link/../new.txt")
            .accepted()
            .unwrap();
        assert_eq!(provisional.as_path(), f.root.join("new.txt"));

        fs::write(provisional.as_path(), "data").unwrap();

        // The OS resolves the raw fragment through the symlink to test/new.txt.
        assert_eq!(
            f.pipeline.validate_path("link/../new.txt").rejection().map(Rejection::kind),
            Some("resolution")
        );
        let confirmed = provisional.confirm(&f.pipeline).accepted().unwrap();
        assert_eq!(confirmed.as_path(), f.root.join("new.txt"));
    }

    #[test]
    fn test_new_path_escapes_are_rejected() {
        let f = fixture();
        let verdict = f.pipeline.validate_new_path("../../System/new.txt");
        assert_eq!(verdict.rejection().map(Rejection::kind), Some("traversal"));

        let verdict = f.pipeline.validate_new_path("a\0b");
        assert_eq!(verdict.rejection().map(Rejection::kind), Some("resolution"));
    }

    #[cfg(unix)]
    #[test]
    fn test_new_path_under_escaping_symlink_is_rejected() {
        let f = fixture();
        let outside = f.root.parent().unwrap().parent().unwrap().join("System");
        std::os::unix::fs::symlink(&outside, f.root.join("out")).unwrap();

        let verdict = f.pipeline.validate_new_path("out/new.txt");
        assert_eq!(verdict.rejection().map(Rejection::kind), Some("traversal"));
    }

    #[tokio::test]
    async fn test_offloaded_path_validation() {
        let f = fixture();
        let root = f.root.clone();
        let pipeline = Arc::new(f.pipeline);

        let verdict = Arc::clone(&pipeline)
            .validate_path_offloaded("test".to_string())
            .await
            .unwrap();
        assert_eq!(verdict.accepted().unwrap().as_path(), root.join("test"));

        let verdict = pipeline
            .validate_path_offloaded("../../System".to_string())
            .await
            .unwrap();
        assert!(!verdict.is_accepted());
    }

    #[test]
    fn test_concurrent_callers_share_one_pipeline() {
        let f = fixture();
        let shared = Arc::new(SharedPipeline::new(f.pipeline));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    let pipeline = shared.snapshot();
                    let clean = pipeline.validate_text(&format!("message {i}"));
                    let dirty = pipeline.validate_text("\u{FE64}script\u{FE65}");
                    let path = pipeline.validate_path("test");
                    clean.is_accepted() && !dirty.is_accepted() && path.is_accepted()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_config_file_round_trip_into_pipeline() {
        let f = fixture();
        let file = f.root.join("guard.toml");
        fs::write(
            &file,
            format!(
                "trusted_root = {:?}\n\n[[forbidden_rules]]\nid = \"iframe\"\npattern = \"<iframe\"\ncase_insensitive = true\n",
                f.root.display().to_string()
            ),
        )
        .unwrap();

        let pipeline = ValidationPipeline::new(PipelineConfig::load(Path::new(&file)).unwrap());
        assert!(pipeline.validate_text("<script>").is_accepted());
        assert!(!pipeline.validate_text("\u{FF1C}IFRAME src=x\u{FF1E}").is_accepted());
        assert!(pipeline.validate_path("guard.toml").is_accepted());
    }
}
