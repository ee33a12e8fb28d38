//! Unit tests for `AppError` display formatting and conversions.

use catalog_intake::AppError;

#[test]
fn display_prefixes_domain() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Db("locked".into()), "db: locked"),
        (AppError::Queue("closed".into()), "queue: closed"),
        (AppError::Validation("nope".into()), "validation: nope"),
        (AppError::NotFound("inquiry x".into()), "not found: inquiry x"),
        (
            AppError::SimulatedFailure("ref T-1".into()),
            "simulated failure: ref T-1",
        ),
        (AppError::Http("bind".into()), "http: bind"),
        (AppError::Io("disk".into()), "io: disk"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn toml_error_converts_to_config() {
    let err: AppError = toml::from_str::<toml::Value>("= broken")
        .expect_err("invalid toml")
        .into();
    assert!(matches!(err, AppError::Config(msg) if msg.starts_with("invalid config:")));
}

#[test]
fn json_error_converts_to_db() {
    let err: AppError = serde_json::from_str::<Vec<String>>("{")
        .expect_err("invalid json")
        .into();
    assert!(matches!(err, AppError::Db(msg) if msg.starts_with("json:")));
}

#[test]
fn sqlx_error_converts_to_db() {
    let err: AppError = sqlx::Error::RowNotFound.into();
    assert!(matches!(err, AppError::Db(_)));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Queue("closed".into()));
}
