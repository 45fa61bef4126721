use std::sync::Arc;
use std::time::Duration;

use hostmetrics_mi::*;

hostmetrics_mi::mi_record! {
    #[derive(Debug, Clone, PartialEq, Default)]
    struct Win32Process {
        name: String => "Name",
    }
}

hostmetrics_mi::mi_record! {
    #[derive(Debug, Clone, PartialEq, Default)]
    struct Counted {
        name: String => "Name",
        count: u32 => "Count",
    }
}

fn snapshot() -> Snapshot {
    Snapshot::new()
        .with_class(
            &Namespace::ROOT_CIMV2,
            "Win32_Process",
            ClassData::new(&["Name", "Handle"])
                .with_instance([("Name", "System Idle Process"), ("Handle", "0")])
                .with_instance([("Name", "System"), ("Handle", "4")])
                .with_instance([("Name", "Registry"), ("Handle", "108")])
                .with_instance([("Name", "smss.exe"), ("Handle", "512")])
                .with_instance([("Name", "csrss.exe"), ("Handle", "640")]),
        )
        .with_class(
            &Namespace::ROOT_CIMV2,
            "Win32_PrintJob",
            ClassData::new(&["Name", "Status"]),
        )
        .with_class(
            &Namespace::ROOT_CIMV2,
            "Win32_Directory",
            ClassData::new(&["Name"])
                .with_instance([("Name", r"C:\Windows")])
                .with_instance([("Name", r"C:\Users\o'brien")]),
        )
        .with_class(
            &Namespace::ROOT_CIMV2,
            "Counted",
            ClassData::new(&["Name", "Count"])
                .with_instance([("Name", Value::from("X")), ("Count", Value::U64(7))])
                .with_instance([("Name", Value::from("Y"))]),
        )
}

fn setup() -> (Arc<MemoryProvider>, Application, Session) {
    let provider = Arc::new(MemoryProvider::new(snapshot()));
    let application = Application::initialize(provider.clone()).unwrap();
    let options = application
        .new_destination_options()
        .with_timeout(Duration::from_secs(1))
        .with_locale(Locale::english());
    let session = application.new_session(Some(&options)).unwrap();
    (provider, application, session)
}

fn query(session: &Session, text: &str) -> Operation {
    session
        .query_instances_text(
            OperationFlags::STANDARD_RTTI,
            &Namespace::ROOT_CIMV2,
            Dialect::Wql,
            text,
        )
        .unwrap()
}

#[test]
fn test_application_initialize_and_close() {
    let provider = Arc::new(MemoryProvider::new(Snapshot::new()));
    let mut application = Application::initialize(provider.clone()).unwrap();
    assert!(application.is_open());

    application.close().unwrap();
    assert_eq!(application.close(), Err(MiError::NotOpen("application")));
    assert!(matches!(
        application.new_session(None),
        Err(MiError::NotOpen("application"))
    ));
}

#[test]
fn test_double_initialization_rejected() {
    let provider = Arc::new(MemoryProvider::new(Snapshot::new()));
    let _application = Application::initialize(provider.clone()).unwrap();
    let err = Application::initialize(provider).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolMisuse);
}

#[test]
fn test_unavailable_runtime() {
    let provider = Arc::new(MemoryProvider::new(Snapshot::new()));
    provider.set_faults(Faults { unavailable: true, ..Faults::default() });
    let err = Application::initialize(provider).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[test]
fn test_test_connection() {
    let (provider, mut application, mut session) = setup();
    session.test_connection().unwrap();

    provider.set_faults(Faults { unreachable: true, ..Faults::default() });
    let err = session.test_connection().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    // a failed round trip opens no cursor
    assert_eq!(provider.handle_count(), 1);

    session.close().unwrap();
    application.close().unwrap();
    assert_eq!(provider.handle_count(), 0);
}

#[test]
fn test_session_timeout_leaves_nothing_open() {
    let provider = Arc::new(MemoryProvider::new(snapshot()).with_latency(Duration::from_millis(40)));
    let application = Application::initialize(provider.clone()).unwrap();
    let options = DestinationOptions::new().with_timeout(Duration::from_millis(5));

    let err = application.new_session(Some(&options)).unwrap_err();
    assert_eq!(err, MiError::Timeout(Duration::from_millis(5)));
    assert!(err.is_retryable());
    assert_eq!(provider.handle_count(), 0);

    // provider defaults carry no timeout
    let session = application.new_session(None).unwrap();
    assert!(session.is_open());
}

#[test]
fn test_query_single_row() {
    let (_provider, _application, session) = setup();
    let mut operation = query(&session, "select Name from win32_process where handle = 0");

    let (instance, more) = operation.get_instance().unwrap();
    let instance = instance.unwrap();
    assert!(!more);
    assert_ne!(instance.element_count(), 0);
    let element = instance.get_element("Name").unwrap();
    assert_eq!(element.value(), &Value::from("System Idle Process"));

    operation.close().unwrap();
    // copied out at fetch time, still readable after close
    assert_eq!(instance.get_element("Name").unwrap().value().as_str(), Some("System Idle Process"));
}

#[test]
fn test_backslash_escaped_path_literals() {
    let (_provider, _application, session) = setup();

    let mut dirs: Vec<Win32Process> = Vec::new();
    let text = r"SELECT Name FROM Win32_Directory WHERE Name = 'C:\\Windows'";
    session
        .query(&mut dirs, &Namespace::ROOT_CIMV2, &Query::parse(text).unwrap())
        .unwrap();
    assert_eq!(dirs, vec![Win32Process { name: r"C:\Windows".to_string() }]);

    // built text goes through the same escaping
    let built = Query::new("Win32_Directory")
        .select(&["Name"])
        .filter(Predicate::eq("Name", r"C:\Users\o'brien"));
    let mut operation = query(&session, &built.build());
    let (instance, more) = operation.get_instance().unwrap();
    assert!(!more);
    assert_eq!(
        instance.unwrap().get_element("Name").unwrap().value().as_str(),
        Some(r"C:\Users\o'brien")
    );
    operation.close().unwrap();
}

#[test]
fn test_empty_result_is_not_an_error() {
    let (_provider, _application, session) = setup();
    let mut operation = query(&session, "SELECT Name, Status FROM win32_PrintJob");

    let (instance, more) = operation.get_instance().unwrap();
    assert!(instance.is_none());
    assert!(!more);
    operation.close().unwrap();

    let mut jobs: Vec<Win32Process> = Vec::new();
    session
        .query(&mut jobs, &Namespace::ROOT_CIMV2, &Query::parse("SELECT Name FROM win32_PrintJob").unwrap())
        .unwrap();
    assert!(jobs.is_empty());
}

#[test]
fn test_pagination_flags_and_exhaustion() {
    let (_provider, _application, session) = setup();
    let mut operation = query(&session, "SELECT Name FROM Win32_Process");

    let mut names = Vec::new();
    let mut flags = Vec::new();
    loop {
        let (instance, more) = operation.get_instance().unwrap();
        names.push(instance.unwrap().get_element("Name").unwrap().value().clone());
        flags.push(more);
        if !more {
            break;
        }
    }

    assert_eq!(flags, vec![true, true, true, true, false]);
    assert_eq!(
        names,
        ["System Idle Process", "System", "Registry", "smss.exe", "csrss.exe"]
            .map(Value::from)
            .to_vec()
    );
    assert_eq!(operation.state(), CursorState::Exhausted);

    let err = operation.get_instance().unwrap_err();
    assert!(matches!(err, MiError::ProtocolMisuse(_)));
    operation.close().unwrap();
}

#[test]
fn test_operation_unmarshal_keeps_cursor_order() {
    let (_provider, _application, session) = setup();
    let mut operation = query(
        &session,
        "SELECT Name FROM Win32_Process WHERE Handle = 0 OR Handle = 4",
    );

    let mut processes: Vec<Win32Process> = Vec::new();
    operation.unmarshal(&mut processes).unwrap();
    assert_eq!(
        processes,
        vec![
            Win32Process { name: "System Idle Process".to_string() },
            Win32Process { name: "System".to_string() },
        ]
    );
    operation.close().unwrap();
}

#[test]
fn test_session_query_unmarshal() {
    let (_provider, _application, session) = setup();
    let query = Query::parse("select Name from win32_process where handle = 0").unwrap();

    let mut processes: Vec<Win32Process> = Vec::new();
    session
        .query_unmarshal(&mut processes, OperationFlags::STANDARD_RTTI, &Namespace::ROOT_CIMV2, &query)
        .unwrap();
    assert_eq!(processes, vec![Win32Process { name: "System Idle Process".to_string() }]);
}

#[test]
fn test_single_instance_contract() {
    let (provider, _application, session) = setup();
    let flags = OperationFlags::STANDARD_RTTI;
    let ns = Namespace::ROOT_CIMV2;

    let mut one = Win32Process::default();
    let exact = Query::parse("SELECT Name FROM Win32_Process WHERE Handle = 4").unwrap();
    session.query_unmarshal_single(&mut one, flags, &ns, &exact).unwrap();
    assert_eq!(one.name, "System");

    for text in [
        "SELECT Name FROM Win32_Process WHERE Handle = 99",
        "SELECT Name FROM Win32_Process WHERE Handle < 100",
    ] {
        let mut dst = Win32Process { name: "untouched".to_string() };
        let err = session
            .query_unmarshal_single(&mut dst, flags, &ns, &Query::parse(text).unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedInstanceCount, "{text}");
        assert_eq!(dst.name, "untouched");
    }
    assert_eq!(provider.handle_count(), 1);
}

#[test]
fn test_tag_mapping_round_trip_and_missing_element() {
    let (provider, _application, session) = setup();
    let ns = Namespace::ROOT_CIMV2;

    let mut dst: Vec<Counted> = Vec::new();
    let query = Query::new("Counted").filter(Predicate::eq("Name", "X"));
    session.query(&mut dst, &ns, &query).unwrap();
    assert_eq!(dst, vec![Counted { name: "X".to_string(), count: 7 }]);

    // Y has Count projected as null rather than absent, so it is a type mismatch
    let mut dst: Vec<Counted> = Vec::new();
    let err = session.query(&mut dst, &ns, &Query::new("Counted")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert!(dst.is_empty());

    // a projection without Count leaves the element absent altogether
    let mut dst = vec![Counted { name: "keep".to_string(), count: 1 }];
    let err = session
        .query(&mut dst, &ns, &Query::new("Counted").select(&["Name"]))
        .unwrap_err();
    assert_eq!(err, MiError::ElementNotFound("Count".to_string()));
    assert_eq!(dst, vec![Counted { name: "keep".to_string(), count: 1 }]);

    assert_eq!(provider.handle_count(), 1);
}

#[test]
fn test_no_leak_under_early_abandonment() {
    let (provider, mut application, mut session) = setup();
    let baseline = provider.handle_count();

    for _ in 0..1000 {
        let mut operation = query(&session, "SELECT Name FROM Win32_Process");
        let (instance, more) = operation.get_instance().unwrap();
        assert!(instance.is_some());
        assert!(more);
        operation.close().unwrap();
    }
    assert_eq!(provider.handle_count(), baseline);

    for _ in 0..100 {
        let mut operation = query(&session, "SELECT Name FROM Win32_Process");
        operation.get_instance().unwrap();
        drop(operation);
    }
    assert_eq!(provider.handle_count(), baseline);

    session.close().unwrap();
    application.close().unwrap();
    assert_eq!(provider.handle_count(), 0);
}

#[test]
fn test_repeated_queries_do_not_leak() {
    let (provider, _application, session) = setup();
    let printers = Query::parse("SELECT Name, Status FROM win32_PrintJob").unwrap();
    let processes = Query::parse("SELECT Name FROM Win32_Process").unwrap();

    for _ in 0..500 {
        let mut jobs: Vec<Win32Process> = Vec::new();
        session.query(&mut jobs, &Namespace::ROOT_CIMV2, &printers).unwrap();
        let mut procs: Vec<Win32Process> = Vec::new();
        session.query(&mut procs, &Namespace::ROOT_CIMV2, &processes).unwrap();
        assert_eq!(procs.len(), 5);
    }
    assert_eq!(provider.handle_count(), 1);
}

#[test]
fn test_second_close_is_not_open() {
    let (_provider, mut application, mut session) = setup();
    let mut operation = query(&session, "SELECT Name FROM Win32_Process");

    operation.close().unwrap();
    assert_eq!(operation.close(), Err(MiError::NotOpen("operation")));
    assert_eq!(operation.get_instance().unwrap_err(), MiError::NotOpen("operation"));

    session.close().unwrap();
    assert_eq!(session.close(), Err(MiError::NotOpen("session")));
    assert_eq!(session.test_connection(), Err(MiError::NotOpen("session")));

    application.close().unwrap();
    assert_eq!(application.close(), Err(MiError::NotOpen("application")));
}

#[test]
fn test_session_close_force_closes_operations() {
    let (provider, _application, mut session) = setup();
    let mut first = query(&session, "SELECT Name FROM Win32_Process");
    let mut second = query(&session, "SELECT Name FROM Win32_Process");
    first.get_instance().unwrap();
    assert_eq!(provider.handle_count(), 3);

    session.close().unwrap();
    assert_eq!(provider.handle_count(), 0);

    assert_eq!(first.get_instance().unwrap_err(), MiError::NotOpen("operation"));
    assert_eq!(first.state(), CursorState::Closed);
    assert_eq!(second.close(), Err(MiError::NotOpen("operation")));
}

#[test]
fn test_application_close_force_closes_sessions() {
    let (provider, mut application, session) = setup();
    let other = application.new_session(None).unwrap();
    let _operation = query(&other, "SELECT Name FROM Win32_Process");
    assert_eq!(provider.handle_count(), 3);

    application.close().unwrap();
    assert_eq!(provider.handle_count(), 0);
    assert!(!session.is_open());
    assert!(!other.is_open());
}

#[test]
fn test_drop_releases_everything() {
    let (provider, application, session) = setup();
    let operation = query(&session, "SELECT Name FROM Win32_Process");
    assert_eq!(provider.handle_count(), 2);

    drop(operation);
    drop(session);
    assert_eq!(provider.handle_count(), 0);
    drop(application);
}

#[test]
fn test_mid_stream_failure() {
    let (provider, _application, session) = setup();
    provider.set_faults(Faults { fail_after: Some(1), ..Faults::default() });

    let mut operation = query(&session, "SELECT Name FROM Win32_Process");
    operation.get_instance().unwrap();
    let err = operation.get_instance().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert_eq!(operation.state(), CursorState::Failed);
    assert!(matches!(operation.get_instance(), Err(MiError::ProtocolMisuse(_))));
    operation.close().unwrap();

    // the session stays usable for the next scrape
    provider.set_faults(Faults::default());
    let mut procs: Vec<Win32Process> = Vec::new();
    session
        .query(&mut procs, &Namespace::ROOT_CIMV2, &Query::new("Win32_Process").select(&["Name"]))
        .unwrap();
    assert_eq!(procs.len(), 5);
    assert_eq!(provider.handle_count(), 1);
}

#[test]
fn test_execution_errors_surface_verbatim() {
    let (provider, _application, session) = setup();
    let err = session
        .query_instances_text(
            OperationFlags::STANDARD_RTTI,
            &Namespace::ROOT_CIMV2,
            Dialect::Wql,
            "SELECT Name FROM Win32_Missing",
        )
        .unwrap_err();
    assert_eq!(err, MiError::Execution("invalid class Win32_Missing".to_string()));

    let err = session
        .query_instances_text(
            OperationFlags::STANDARD_RTTI,
            &Namespace::ROOT_CIMV2,
            Dialect::Wql,
            "SELECT Name FROM",
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CompileError);
    assert_eq!(provider.handle_count(), 1);
}

#[test]
fn test_concurrent_scrapes() {
    let (provider, _application, session) = setup();
    let session = Arc::new(session);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let session = Arc::clone(&session);
            scope.spawn(move || {
                for _ in 0..50 {
                    let mut procs: Vec<Win32Process> = Vec::new();
                    session
                        .query(&mut procs, &Namespace::ROOT_CIMV2, &Query::new("Win32_Process").select(&["Name"]))
                        .unwrap();
                    assert_eq!(procs.len(), 5);
                }
            });
        }
    });

    assert_eq!(provider.handle_count(), 1);
}
