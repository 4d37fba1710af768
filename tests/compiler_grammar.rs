//! Black-box grammar/syntax coverage for the `.bridge` compiler, driven
//! entirely through the public `compile`/`diagnostics` entry points (the
//! lexer, parser, and lowering pass are private modules).

use bridge_engine::{compile, diagnostics, CompileError};

#[test]
fn version_header_is_required_and_checked() {
    let err = compile("version 1.0").unwrap_err();
    assert!(matches!(err, CompileError::VersionMismatch { found, .. } if found == "1.0"));
}

#[test]
fn comments_are_ignored() {
    let source = r#"
        # a leading comment
        version 1.4 # trailing comment
        bridge Query.echo {
            with input as i
            with output as o
            o.text <- i.text # another comment
        }
    "#;
    assert!(compile(source).is_ok());
}

#[test]
fn string_escapes_are_honored_in_on_error_literals() {
    let source = r#"
        version 1.4
        tool flaky from boom {
            on error = "line one\nline \"two\""
        }
        bridge Query.echo {
            with input as i
            with output as o
            o.label <- flaky.label
        }
    "#;
    assert!(compile(source).is_ok());
}

#[test]
fn a_keyword_prefix_does_not_swallow_a_longer_identifier() {
    // `tools` must lex as one identifier, not `tool` + `s`.
    let source = r#"
        version 1.4
        bridge Query.echo {
            with input as tools
            with output as o
            o.value <- tools.value
        }
    "#;
    assert!(compile(source).is_ok());
}

#[test]
fn negative_and_exponent_number_literals_compile() {
    let source = r#"
        version 1.4
        const low = -3
        const tiny = 2E-3
        bridge Query.echo {
            with input as i
            with output as o
            o.value <- i.value
        }
    "#;
    assert!(compile(source).is_ok());
}

#[test]
fn unexpected_character_reports_its_line() {
    let err = compile("version 1.4\nbridge Query.echo {\n    @\n}").unwrap_err();
    assert!(matches!(err, CompileError::SyntaxError { line: 3, .. }));
}

#[test]
fn undeclared_handle_is_reported_by_name_and_line() {
    let err = compile(
        r#"
            version 1.4
            bridge Query.echo {
                with output as o
                o.value <- missing.value
            }
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::UndeclaredHandle { handle, .. } if handle == "missing"));
}

#[test]
fn unknown_tool_reference_is_rejected() {
    let err = compile(
        r#"
            version 1.4
            bridge Query.echo {
                with input as i
                with ghostTool as g
                with output as o
                o.value <- g.value
            }
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::UnknownTool { name, .. } if name == "ghostTool"));
}

#[test]
fn duplicate_handle_alias_is_rejected() {
    let err = compile(
        r#"
            version 1.4
            tool api.get from http.get
            tool api.post from http.post
            bridge Query.echo {
                with input as i
                with api.get as h
                with api.post as h
                with output as o
                o.value <- h.value
            }
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::DuplicateHandle { name, .. } if name == "h"));
}

#[test]
fn array_index_on_a_wire_target_is_rejected() {
    let err = compile(
        r#"
            version 1.4
            bridge Query.echo {
                with input as i
                with output as o
                o.items.0.name <- i.name
            }
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::ArrayIndexOnTarget { .. }));
}

#[test]
fn passthrough_shorthand_compiles_against_a_define() {
    let source = r#"
        version 1.4
        define getWeather {
            with input as args
            output.temp <- args.city
        }
        bridge Query.weather with getWeather
    "#;
    assert!(compile(source).is_ok());
}

#[test]
fn recovery_mode_keeps_going_past_a_bad_top_level_item() {
    let source = r#"
        version 1.4
        const a = 1
        tool 123 from 456
        const b = 2
    "#;
    let result = diagnostics(source);
    assert!(!result.diagnostics.is_empty());
    let names: Vec<&str> = result
        .instructions
        .as_ref()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| match i {
                    bridge_engine::Instruction::Const(c) => Some(c.name.as_str()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    // The lowering pass only runs over a fully clean parse (diagnostics.rs),
    // so a syntax error in the middle item means `instructions` stays
    // `None` even though the parser itself recovered both consts.
    assert!(names.is_empty());
    assert!(result.diagnostics.iter().any(|e| matches!(e, CompileError::SyntaxError { .. })));
}
