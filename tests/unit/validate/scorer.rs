use super::*;

#[test]
fn permissive_scorer_accepts_everything() {
    let img = RgbImage::new(2, 2);
    assert_eq!(PermissiveScorer.similarity("anything", &img).unwrap(), 1.0);
}

#[test]
fn parse_score_reads_first_token() {
    assert_eq!(parse_score("0.25\n").unwrap(), 0.25);
    assert_eq!(parse_score("  -0.5 extra words").unwrap(), -0.5);
    assert!(parse_score("").is_err());
    assert!(parse_score("nope").is_err());
    assert!(parse_score("NaN").is_err());
}

#[cfg(unix)]
#[test]
fn command_scorer_runs_program_with_prompt_and_image() {
    let scorer = CommandScorer::new(CommandScorerConfig {
        program: "sh".into(),
        args: vec![
            "-c".into(),
            r#"[ "$1" = "--prompt" ] && [ "$2" = "a red chair" ] && [ -s "$4" ] && echo 0.42"#
                .into(),
            "scorer".into(),
        ],
    });
    let img = RgbImage::new(4, 4);
    let v = scorer.similarity("a red chair", &img).unwrap();
    assert!((v - 0.42).abs() < 1e-6);
}

#[cfg(unix)]
#[test]
fn command_scorer_reports_failures() {
    let scorer = CommandScorer::new(CommandScorerConfig {
        program: "sh".into(),
        args: vec!["-c".into(), "echo boom >&2; exit 3".into(), "scorer".into()],
    });
    let err = scorer.similarity("x", &RgbImage::new(1, 1)).unwrap_err();
    assert!(format!("{err:#}").contains("boom"));

    let missing = CommandScorer::new(CommandScorerConfig {
        program: "/nonexistent/scorer-bin".into(),
        args: vec![],
    });
    assert!(missing.similarity("x", &RgbImage::new(1, 1)).is_err());
}
