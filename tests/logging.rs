use httpbackend::Backend;

#[test]
fn test_missing_respond_bad() {
    testing_logger::setup();

    let backend = Backend::new();
    let stub = backend.when("GET", "/");
    drop(stub);

    // Expecting one warning
    testing_logger::validate(|captured_logs| {
        let warnings = captured_logs
            .iter()
            .filter(|c| c.level == log::Level::Warn)
            .collect::<Vec<&testing_logger::CapturedLog>>();

        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].body,
            "Missing .respond() or .passthrough() call on stub GET /"
        );
    });
}

#[test]
fn test_missing_respond_good() {
    testing_logger::setup();

    let backend = Backend::new();
    let stub = backend.when("GET", "/").respond("");
    drop(stub);
    let stub = backend.expect("GET", "/assets").passthrough();
    drop(stub);

    // No warnings should occur
    testing_logger::validate(|captured_logs| {
        assert_eq!(
            captured_logs
                .iter()
                .filter(|c| c.level == log::Level::Warn)
                .count(),
            0
        );
    });
}

#[test]
fn test_cleared_stub_does_not_warn() {
    testing_logger::setup();

    let backend = Backend::new();
    let stub = backend.when("GET", "/");
    backend.clear();
    drop(stub);

    testing_logger::validate(|captured_logs| {
        assert!(captured_logs.iter().all(|c| c.level != log::Level::Warn));
    });
}
