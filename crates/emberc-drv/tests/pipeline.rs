//! End-to-end pipeline tests driving the public session API.

use emberc_drv::{Config, Session};

fn session_for(source: &str) -> Session {
    let mut session = Session::new(Config::default()).expect("session");
    session.add_source_from_string("test.em", source);
    session
}

#[test]
fn test_arithmetic_assignment_executes() {
    // `a := 5 + 7 * 2;` leaves 19 in the register bound to `a`.
    let mut session = session_for("a := 5 + 7 * 2;");
    assert!(session.compile(), "{:?}", session.diagnostics());
    assert!(session.execute());

    let register = session.register_for("a").expect("a was lowered");
    assert_eq!(session.terp().register_file().i[register as usize], 19);
}

#[test]
fn test_chained_assignments_execute() {
    let mut session = session_for("a := 6; b := a * 7; c := b - 2;");
    assert!(session.compile(), "{:?}", session.diagnostics());
    assert!(session.execute());

    let value = |session: &Session, name: &str| {
        let register = session.register_for(name).unwrap();
        session.terp().register_file().i[register as usize]
    };
    assert_eq!(value(&session, "a"), 6);
    assert_eq!(value(&session, "b"), 42);
    assert_eq!(value(&session, "c"), 40);
}

#[test]
fn test_interned_strings_reach_the_heap() {
    let mut session = session_for("greeting := \"hello\"; other := \"hello\";");
    assert!(session.compile(), "{:?}", session.diagnostics());

    // Same content interned once.
    assert_eq!(session.interner().len(), 1);

    let symbol = session
        .assembler()
        .symbol("_intern_str_lit_1_data")
        .expect("data label defined");
    let base = session
        .assembler()
        .symbol("_intern_str_lit_1")
        .expect("base label defined");
    assert_eq!(base.address % 4, 0);
    assert_eq!(symbol.address, base.address + 8);

    let data = symbol.address as usize;
    assert_eq!(&session.terp().heap()[data..data + 5], b"hello");

    let mut length = [0u8; 8];
    length.copy_from_slice(&session.terp().heap()[base.address as usize..base.address as usize + 8]);
    assert_eq!(u64::from_le_bytes(length), 5);
}

#[test]
fn test_parse_error_fails_session() {
    let mut session = session_for("a := ;");
    assert!(!session.compile());
    assert!(session.is_failed());
    assert!(session
        .diagnostics()
        .iter()
        .any(|diagnostic| diagnostic.code == "B021"));
    // Rendered output carries the caret snippet.
    assert!(session
        .rendered_diagnostics()
        .iter()
        .any(|text| text.contains("error[B021]") && text.contains('^')));
}

#[test]
fn test_unresolved_identifier_fails_session() {
    let mut session = session_for("a := nowhere;");
    assert!(!session.compile());
    assert!(session
        .diagnostics()
        .iter()
        .any(|diagnostic| diagnostic.code == "P003"));
}

#[test]
fn test_multiple_sources_compile_into_one_program() {
    let mut session = Session::new(Config::default()).expect("session");
    session.add_source_from_string("one.em", "a := 2;");
    session.add_source_from_string("two.em", "b := 3;");
    assert!(session.compile(), "{:?}", session.diagnostics());
    assert!(session.execute());
    assert_eq!(session.register_for("a"), Some(0));
    assert_eq!(session.register_for("b"), Some(1));
}

#[test]
fn test_graph_dumps_write_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ast_path = dir.path().join("ast.dot");
    let dom_path = dir.path().join("dom.dot");

    let mut session = session_for("a := 1 + 2;");
    assert!(session.compile(), "{:?}", session.diagnostics());
    session.write_ast_graph_file(&ast_path).expect("ast graph");
    session.write_dom_graph_file(&dom_path).expect("dom graph");

    let ast_text = std::fs::read_to_string(&ast_path).unwrap();
    assert!(ast_text.contains("digraph"));
    assert!(ast_text.contains("binary_operator"));

    let dom_text = std::fs::read_to_string(&dom_path).unwrap();
    assert!(dom_text.contains("digraph"));
    assert!(dom_text.contains("identifier"));
}

#[test]
fn test_namespaced_program_compiles() {
    // Nested namespaces through the whole pipeline.
    let mut session = session_for("ns foo { ns bar { x := 1; }; };");
    assert!(session.compile(), "{:?}", session.diagnostics());
    assert!(session.execute());
}

#[test]
fn test_code_and_constant_segments_recorded() {
    let mut session = session_for("a := 1; s := \"data\";");
    assert!(session.compile(), "{:?}", session.diagnostics());

    let code = session
        .assembler()
        .segment(emberc_vm::SegmentKind::Code)
        .expect("code segment");
    assert_eq!(code.address as usize, emberc_vm::Terp::PROGRAM_START);
    assert!(code.size > 0);

    let constants = session
        .assembler()
        .segment(emberc_vm::SegmentKind::Constant)
        .expect("constant segment");
    assert!(constants.address >= code.address + code.size);
    assert!(constants.size >= 12);
}
