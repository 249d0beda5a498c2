//! End-to-end evaluation tests
//!
//! Modules are built through the AST builder and registered directly with
//! the loader, standing in for a front end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use marl_ast::{builder, BinaryOp, Module, ModuleMember, ObjectBodyMember, Span};
use marl_runtime::{
    Checksums, DiskCachedPackageResolver, ErrorKind, EvalResult, Evaluator, EvaluatorOptions,
    ModuleCache, ModuleLoader, PackageResolver, PackageUri, ReaderRegistry, ResourceReader,
    SecurityManager, Value,
};

fn props(pairs: Vec<(&str, marl_ast::Expr)>) -> Module {
    builder::module(
        pairs
            .into_iter()
            .map(|(name, value)| ModuleMember::Property(builder::prop(name, value)))
            .collect(),
    )
}

fn evaluator_with(modules: Vec<(&str, Module)>) -> Evaluator {
    let evaluator = Evaluator::with_defaults();
    for (uri, module) in modules {
        evaluator.loader().borrow().insert_ast(uri, module);
    }
    evaluator
}

fn render(evaluator: &Evaluator, uri: &str) -> String {
    let value = evaluator.evaluate_uri(uri).expect("evaluation failed");
    evaluator.render_json(&value).expect("rendering failed")
}

// --- amendment ---------------------------------------------------------------

#[test]
fn amending_module_overrides_in_place() {
    // N declares x = 1, y = 2; M amends N with y = x + 1. The override keeps
    // y's position and resolves x in M's scope.
    let n = props(vec![
        ("x", builder::int(1)),
        ("y", builder::int(2)),
    ]);
    let m = builder::amends_module(
        "repl:n",
        vec![ModuleMember::Property(builder::prop(
            "y",
            builder::add(builder::ident("x"), builder::int(1)),
        ))],
    );

    let evaluator = evaluator_with(vec![("repl:n", n), ("repl:m", m)]);
    insta::assert_snapshot!(render(&evaluator, "repl:m"), @r#"
    {
      "x": 1,
      "y": 2
    }
    "#);
}

#[test]
fn new_members_append_after_parent_order() {
    let n = props(vec![
        ("x", builder::int(1)),
        ("y", builder::int(2)),
    ]);
    let m = builder::amends_module(
        "repl:n",
        vec![
            ModuleMember::Property(builder::prop("z", builder::int(3))),
            ModuleMember::Property(builder::prop("y", builder::int(20))),
        ],
    );

    let evaluator = evaluator_with(vec![("repl:n", n), ("repl:m", m)]);
    insta::assert_snapshot!(render(&evaluator, "repl:m"), @r#"
    {
      "x": 1,
      "y": 20,
      "z": 3
    }
    "#);
}

#[test]
fn super_chains_across_amendment_levels() {
    let n = props(vec![("y", builder::int(2))]);
    let m = builder::amends_module(
        "repl:n",
        vec![ModuleMember::Property(builder::prop(
            "y",
            builder::add(builder::member(builder::super_ref(), "y"), builder::int(10)),
        ))],
    );
    let p = builder::amends_module(
        "repl:m",
        vec![ModuleMember::Property(builder::prop(
            "y",
            builder::bin(
                BinaryOp::Mul,
                builder::member(builder::super_ref(), "y"),
                builder::int(2),
            ),
        ))],
    );

    let evaluator = evaluator_with(vec![("repl:n", n), ("repl:m", m), ("repl:p", p)]);
    // N.y = 2, M.y = 12, P.y = 24
    insta::assert_snapshot!(render(&evaluator, "repl:p"), @r#"
    {
      "y": 24
    }
    "#);
}

#[test]
fn nested_object_amendment_keeps_unmodified_members() {
    let n = builder::module(vec![ModuleMember::Property(builder::object_prop(
        "server",
        builder::body(vec![
            builder::body_prop("host", builder::str("localhost")),
            builder::body_prop("port", builder::int(8080)),
        ]),
    ))]);
    let m = builder::amends_module(
        "repl:n",
        vec![ModuleMember::Property(builder::object_prop(
            "server",
            builder::body(vec![builder::body_prop("port", builder::int(9090))]),
        ))],
    );

    let evaluator = evaluator_with(vec![("repl:n", n), ("repl:m", m)]);
    insta::assert_snapshot!(render(&evaluator, "repl:m"), @r#"
    {
      "server": {
        "host": "localhost",
        "port": 9090
      }
    }
    "#);
}

#[test]
fn amendment_does_not_corrupt_parent_memo() {
    let n = props(vec![
        ("x", builder::int(1)),
        ("y", builder::add(builder::ident("x"), builder::int(1))),
    ]);
    let m = builder::amends_module(
        "repl:n",
        vec![ModuleMember::Property(builder::prop("x", builder::int(10)))],
    );

    let evaluator = evaluator_with(vec![("repl:n", n), ("repl:m", m)]);
    insta::assert_snapshot!(render(&evaluator, "repl:m"), @r#"
    {
      "x": 10,
      "y": 11
    }
    "#);
    // The parent module still renders its own values afterwards
    insta::assert_snapshot!(render(&evaluator, "repl:n"), @r#"
    {
      "x": 1,
      "y": 2
    }
    "#);
}

#[test]
fn sibling_amendments_evaluate_independently() {
    let n = props(vec![
        ("x", builder::int(1)),
        ("y", builder::add(builder::ident("x"), builder::int(1))),
    ]);
    let a = builder::amends_module(
        "repl:n",
        vec![ModuleMember::Property(builder::prop("x", builder::int(10)))],
    );
    let b = builder::amends_module(
        "repl:n",
        vec![ModuleMember::Property(builder::prop("x", builder::int(100)))],
    );

    let evaluator = evaluator_with(vec![("repl:n", n), ("repl:a", a), ("repl:b", b)]);
    insta::assert_snapshot!(render(&evaluator, "repl:a"), @r#"
    {
      "x": 10,
      "y": 11
    }
    "#);
    insta::assert_snapshot!(render(&evaluator, "repl:b"), @r#"
    {
      "x": 100,
      "y": 101
    }
    "#);
}

#[test]
fn member_access_on_amendment_sees_overrides() {
    let n = props(vec![
        ("x", builder::int(1)),
        ("y", builder::add(builder::ident("x"), builder::int(1))),
    ]);
    let m = builder::amends_module(
        "repl:n",
        vec![ModuleMember::Property(builder::prop("x", builder::int(10)))],
    );
    let mut q = props(vec![("check", builder::member(builder::ident("m"), "y"))]);
    q.imports.push(builder::import_as("repl:m", "m"));

    let evaluator = evaluator_with(vec![("repl:n", n), ("repl:m", m), ("repl:q", q)]);
    insta::assert_snapshot!(render(&evaluator, "repl:q"), @r#"
    {
      "check": 11
    }
    "#);
}

// --- object bodies -----------------------------------------------------------

#[test]
fn listing_and_mapping_render_in_order() {
    let m = builder::module(vec![
        ModuleMember::Property(builder::object_prop(
            "servers",
            builder::body(vec![
                builder::element(builder::str("alpha")),
                builder::element(builder::str("beta")),
            ]),
        )),
        ModuleMember::Property(builder::object_prop(
            "labels",
            builder::body(vec![builder::entry(
                builder::str("env"),
                builder::str("prod"),
            )]),
        )),
    ]);

    let evaluator = evaluator_with(vec![("repl:m", m)]);
    insta::assert_snapshot!(render(&evaluator, "repl:m"), @r#"
    {
      "servers": [
        "alpha",
        "beta"
      ],
      "labels": {
        "env": "prod"
      }
    }
    "#);
}

#[test]
fn for_generator_builds_listing() {
    let m = builder::module(vec![ModuleMember::Property(builder::object_prop(
        "squares",
        builder::body(vec![ObjectBodyMember::For {
            key_var: None,
            value_var: builder::id("n"),
            iterable: builder::call(
                builder::ident("List"),
                vec![builder::int(1), builder::int(2), builder::int(3)],
            ),
            body: builder::body(vec![builder::element(builder::bin(
                BinaryOp::Mul,
                builder::ident("n"),
                builder::ident("n"),
            ))]),
            span: Span::default(),
        }]),
    ))]);

    let evaluator = evaluator_with(vec![("repl:m", m)]);
    insta::assert_snapshot!(render(&evaluator, "repl:m"), @r#"
    {
      "squares": [
        1,
        4,
        9
      ]
    }
    "#);
}

#[test]
fn when_condition_selects_members() {
    let m = builder::module(vec![ModuleMember::Property(builder::object_prop(
        "svc",
        builder::body(vec![
            builder::body_prop("name", builder::str("api")),
            ObjectBodyMember::When {
                condition: builder::boolean(true),
                body: builder::body(vec![builder::body_prop("replicas", builder::int(3))]),
                else_body: Some(builder::body(vec![builder::body_prop(
                    "replicas",
                    builder::int(1),
                )])),
                span: Span::default(),
            },
        ]),
    ))]);

    let evaluator = evaluator_with(vec![("repl:m", m)]);
    insta::assert_snapshot!(render(&evaluator, "repl:m"), @r#"
    {
      "svc": {
        "name": "api",
        "replicas": 3
      }
    }
    "#);
}

// --- cycles and recovery -----------------------------------------------------

#[test]
fn cyclic_pair_reports_both_members() {
    let m = props(vec![
        ("a", builder::ident("b")),
        ("b", builder::ident("a")),
    ]);

    let evaluator = evaluator_with(vec![("repl:m", m)]);
    let err = evaluator.evaluate_uri("repl:m").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::CyclicEvaluation { .. }));
    let members: Vec<&str> = err.trace.iter().map(|f| f.member.as_str()).collect();
    assert!(members.contains(&"a"));
    assert!(members.contains(&"b"));
}

#[test]
fn direct_self_reference_is_cyclic() {
    let m = props(vec![("a", builder::ident("a"))]);
    let evaluator = evaluator_with(vec![("repl:m", m)]);
    let err = evaluator.evaluate_uri("repl:m").unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::CyclicEvaluation { ref member } if member == "a"
    ));
}

#[test]
fn module_import_cycle_is_resolution_error() {
    let mut m = props(vec![("x", builder::int(1))]);
    m.imports.push(builder::import_as("repl:n", "n"));
    let mut n = props(vec![("y", builder::int(2))]);
    n.imports.push(builder::import_as("repl:m", "m"));

    let evaluator = evaluator_with(vec![("repl:m", m), ("repl:n", n)]);
    let err = evaluator.evaluate_uri("repl:m").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Resolution { .. }));
}

#[test]
fn failed_module_leaves_evaluator_usable() {
    let bad = builder::module(vec![ModuleMember::Property(builder::typed_prop(
        "port",
        builder::ty("Int"),
        Some(builder::str("eighty")),
    ))]);
    let good = props(vec![("x", builder::int(1))]);

    let evaluator = evaluator_with(vec![("repl:bad", bad), ("repl:good", good)]);
    assert!(evaluator.evaluate_uri("repl:bad").is_err());
    insta::assert_snapshot!(render(&evaluator, "repl:good"), @r#"
    {
      "x": 1
    }
    "#);
}

// --- type checking -----------------------------------------------------------

#[test]
fn type_violation_surfaces_at_force_time() {
    let m = builder::module(vec![ModuleMember::Property(builder::typed_prop(
        "port",
        builder::ty("Int"),
        Some(builder::str("eighty")),
    ))]);

    let evaluator = evaluator_with(vec![("repl:m", m)]);
    let err = evaluator.evaluate_uri("repl:m").unwrap_err();
    match err.kind {
        ErrorKind::TypeViolation {
            property,
            expected,
            actual,
        } => {
            assert_eq!(property, "port");
            assert_eq!(expected, "Int");
            assert!(actual.contains("eighty"));
        }
        other => panic!("unexpected error kind: {:?}", other),
    }
}

#[test]
fn constraint_predicate_runs_against_value() {
    let positive_int = builder::constrained(
        builder::ty("Int"),
        vec![builder::bin(
            BinaryOp::Gt,
            builder::this(),
            builder::int(0),
        )],
    );

    let bad = builder::module(vec![ModuleMember::Property(builder::typed_prop(
        "port",
        positive_int.clone(),
        Some(builder::int(-1)),
    ))]);
    let evaluator = evaluator_with(vec![("repl:bad", bad)]);
    let err = evaluator.evaluate_uri("repl:bad").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeViolation { .. }));

    let good = builder::module(vec![ModuleMember::Property(builder::typed_prop(
        "port",
        positive_int,
        Some(builder::int(8080)),
    ))]);
    let evaluator = evaluator_with(vec![("repl:good", good)]);
    insta::assert_snapshot!(render(&evaluator, "repl:good"), @r#"
    {
      "port": 8080
    }
    "#);
}

#[test]
fn listing_element_type_is_enforced_on_lazy_elements() {
    let bad = builder::module(vec![ModuleMember::Property(builder::typed_prop(
        "ports",
        builder::parameterized("Listing", vec![builder::ty("Int")]),
        Some(builder::new_object(
            Some("Listing"),
            builder::body(vec![
                builder::element(builder::int(80)),
                builder::element(builder::str("eighty")),
            ]),
        )),
    ))]);
    let evaluator = evaluator_with(vec![("repl:bad", bad)]);
    let err = evaluator.evaluate_uri("repl:bad").unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::TypeViolation { ref property, .. } if property == "ports"
    ));

    let good = builder::module(vec![ModuleMember::Property(builder::typed_prop(
        "ports",
        builder::parameterized("Listing", vec![builder::ty("Int")]),
        Some(builder::new_object(
            Some("Listing"),
            builder::body(vec![
                builder::element(builder::int(80)),
                builder::element(builder::int(443)),
            ]),
        )),
    ))]);
    let evaluator = evaluator_with(vec![("repl:good", good)]);
    insta::assert_snapshot!(render(&evaluator, "repl:good"), @r#"
    {
      "ports": [
        80,
        443
      ]
    }
    "#);
}

#[test]
fn mapping_value_type_is_enforced_on_lazy_entries() {
    let m = builder::module(vec![ModuleMember::Property(builder::typed_prop(
        "labels",
        builder::parameterized(
            "Mapping",
            vec![builder::ty("String"), builder::ty("Int")],
        ),
        Some(builder::new_object(
            Some("Mapping"),
            builder::body(vec![builder::entry(
                builder::str("replicas"),
                builder::str("three"),
            )]),
        )),
    ))]);
    let evaluator = evaluator_with(vec![("repl:m", m)]);
    let err = evaluator.evaluate_uri("repl:m").unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::TypeViolation { ref property, .. } if property == "labels"
    ));
}

// --- resources and security --------------------------------------------------

struct CountingReader {
    calls: Arc<AtomicUsize>,
}

impl ResourceReader for CountingReader {
    fn scheme(&self) -> &str {
        "counter"
    }

    fn read(&self, _uri: &str) -> EvalResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("42".to_string())
    }
}

#[test]
fn memoized_read_runs_the_reader_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = ReaderRegistry::new();
    registry.register_resource_reader(Arc::new(CountingReader {
        calls: Arc::clone(&calls),
    }));
    let loader = ModuleLoader::new(
        registry,
        Arc::new(SecurityManager::new(
            vec!["repl:".to_string()],
            vec!["counter:".to_string()],
            None,
        )),
        ModuleCache::new(),
    );
    let evaluator = Evaluator::new(loader, EvaluatorOptions::new());

    let m = props(vec![
        ("a", builder::read(builder::str("counter:x"))),
        ("b", builder::ident("a")),
        ("c", builder::ident("a")),
    ]);
    evaluator.loader().borrow().insert_ast("repl:m", m);

    let value = evaluator.evaluate_uri("repl:m").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Repeat rendering only sees memoized values
    evaluator.render_json(&value).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

struct PanickingReader;

impl ResourceReader for PanickingReader {
    fn scheme(&self) -> &str {
        "vault"
    }

    fn read(&self, uri: &str) -> EvalResult<String> {
        panic!("reader invoked for denied URI `{}`", uri);
    }
}

#[test]
fn denied_resource_never_reaches_the_reader() {
    // `vault:` is not on the default resource allow-list, so the read must
    // be rejected before the reader runs.
    let evaluator = Evaluator::with_defaults();
    evaluator
        .loader()
        .borrow_mut()
        .registry_mut()
        .register_resource_reader(Arc::new(PanickingReader));
    evaluator.loader().borrow().insert_ast(
        "repl:m",
        props(vec![("a", builder::read(builder::str("vault:key")))]),
    );

    let err = evaluator.evaluate_uri("repl:m").unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::AccessDenied {
            what: "resource",
            ..
        }
    ));
}

#[test]
fn allowed_but_unregistered_scheme_is_configuration_error() {
    let loader = ModuleLoader::new(
        ReaderRegistry::new(),
        Arc::new(SecurityManager::new(
            vec!["repl:".to_string(), "weird:".to_string()],
            vec![],
            None,
        )),
        ModuleCache::new(),
    );
    let evaluator = Evaluator::new(loader, EvaluatorOptions::new());

    let mut m = props(vec![("x", builder::int(1))]);
    m.imports.push(builder::import_as("weird:thing", "thing"));
    evaluator.loader().borrow().insert_ast("repl:m", m);

    let err = evaluator.evaluate_uri("repl:m").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Configuration(_)));
}

// --- glob imports ------------------------------------------------------------

fn tiny_parse(_uri: &str, source: &str) -> Result<Module, String> {
    let mut members = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| format!("bad line `{}`", line))?;
        let value: i64 = value.trim().parse().map_err(|e| format!("{}", e))?;
        members.push(ModuleMember::Property(builder::prop(
            name.trim(),
            builder::int(value),
        )));
    }
    Ok(builder::module(members))
}

#[test]
fn glob_import_expands_deterministically() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("beta.marl"), "x = 2").unwrap();
    std::fs::write(dir.path().join("alpha.marl"), "x = 1").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a module").unwrap();

    let evaluator = Evaluator::with_defaults();
    evaluator
        .loader()
        .borrow_mut()
        .set_parser(Arc::new(tiny_parse));

    let mut main = builder::module(vec![]);
    let pattern = format!("file://{}/*.marl", dir.path().display());
    main.imports.push(builder::import_glob(&pattern, "all"));
    evaluator.loader().borrow().insert_ast("repl:main", main);

    let value = evaluator.evaluate_uri("repl:main").unwrap();
    let obj = value.as_object().unwrap();
    let member = obj.get_property_member("all").unwrap();
    let Some(Value::Map(map)) = member.get_if_evaluated() else {
        panic!("glob import should produce a map");
    };
    let keys: Vec<String> = map.keys().map(|k| k.to_string()).collect();
    assert_eq!(keys.len(), 2);
    assert!(keys[0].ends_with("alpha.marl\""));
    assert!(keys[1].ends_with("beta.marl\""));
}

// --- timeout -----------------------------------------------------------------

#[test]
fn timeout_faults_the_evaluator() {
    let mut options = EvaluatorOptions::new();
    options.timeout = Some(Duration::from_nanos(1));
    let evaluator = Evaluator::new(ModuleLoader::with_defaults(), options);
    evaluator.loader().borrow().insert_ast(
        "repl:m",
        props(vec![("x", builder::add(builder::int(1), builder::int(2)))]),
    );

    let err = evaluator.evaluate_uri("repl:m").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Timeout));
    assert!(evaluator.is_faulted());

    // A faulted evaluator refuses further work
    let err = evaluator.evaluate_uri("repl:m").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Configuration(_)));
}

// --- package integrity -------------------------------------------------------

#[test]
fn tampered_cache_entry_is_an_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = DiskCachedPackageResolver::with_cache_dir(dir.path().to_path_buf()).unwrap();
    let package = PackageUri::parse("package://pkg.example.com/tools/net@2.1.0").unwrap();

    // Seed a cache entry whose archive no longer matches its declared digest
    let declared = Checksums::compute(b"genuine archive bytes");
    let entry_dir = package.cache_dir(resolver.cache_dir());
    std::fs::create_dir_all(&entry_dir).unwrap();
    let metadata = format!(
        r#"{{
            "name": "net",
            "packageUri": "package://pkg.example.com/tools/net@2.1.0",
            "version": "2.1.0",
            "packageZipUrl": "https://pkg.example.com/tools/net@2.1.0/net.zip",
            "packageZipChecksums": {{ "sha256": "{}" }}
        }}"#,
        declared.sha256
    );
    std::fs::write(entry_dir.join("metadata.json"), metadata).unwrap();
    std::fs::write(entry_dir.join("archive.zip"), b"tampered").unwrap();

    let err = resolver.get_bytes(&package, "/main.marl").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Integrity { .. }));
}
