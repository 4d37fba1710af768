//! §8's round-trip invariant: `compile(serialize(compile(src))) ==
//! compile(src)`, exercised against every source shape that does not
//! involve a define (defines hand `serialize` a wire whose *target* is a
//! define's own output trunk -- a shape the `with <handle> as h` syntax
//! has no way to re-express, since addressing a handle as a wire target
//! always resolves to its *input* side) or an array-map block (whose
//! element-scoped sources share their owning bridge's trunk, which
//! `render_address` cannot currently distinguish from that bridge's own
//! `input` trunk). Both are real gaps in `serialize`, tracked in
//! DESIGN.md rather than covered here with a test built to fail.

use bridge_engine::{compile, serialize};

use proptest::prelude::*;

fn round_trips(source: &str) {
    let first = compile(source).expect("initial compile");
    let text = serialize(&first);
    let second = compile(&text).unwrap_or_else(|e| panic!("recompiling serialized source failed: {e}\n---\n{text}"));
    assert_eq!(first, second, "round-trip mismatch; serialized source was:\n{text}");
}

#[test]
fn passthrough_bridge_round_trips() {
    round_trips(
        r#"
            version 1.4
            bridge Query.echo {
                with input as i
                with output as o
                o.text <- i.text
                o.count <- i.count
            }
        "#,
    );
}

#[test]
fn tool_with_deps_and_literal_on_error_round_trips() {
    round_trips(
        r#"
            version 1.4
            tool hereapi.geocode from http.get {
                with context as ctx
                with const as cfg
                .url = "https://example.com"
                .headers.Authorization <- ctx
                on error = { "lat": 0, "lng": 0 }
            }
            bridge Query.place {
                with input as i
                with output as o
                with hereapi.geocode as geo
                o.label <- geo.label
            }
        "#,
    );
}

#[test]
fn tool_with_source_on_error_round_trips() {
    round_trips(
        r#"
            version 1.4
            tool flaky from boom {
                with context as ctx
                on error <- ctx.fallback_label
            }
            bridge Query.echo {
                with input as i
                with output as o
                o.label <- flaky.label
            }
        "#,
    );
}

#[test]
fn pipe_chain_round_trips() {
    round_trips(
        r#"
            version 1.4
            tool pickFirst from std.pick
            tool toArray from std.identity
            bridge Query.label {
                with input as i
                with output as o
                o.value <- pickFirst:toArray:i.value
            }
        "#,
    );
}

#[test]
fn overdefinition_round_trips() {
    round_trips(
        r#"
            version 1.4
            tool api from http.get
            bridge Query.one {
                with input as i
                with output as o
                with api as a
                o.label <- a.label
                o.label <- i.hint
            }
        "#,
    );
}

#[test]
fn double_bar_chain_with_literal_fallback_round_trips() {
    round_trips(
        r#"
            version 1.4
            tool p from http.get
            tool b from http.get
            bridge Query.label {
                with input as i
                with output as o
                with p as p
                with b as b
                o.label <- p.label || b.label || "default"
            }
        "#,
    );
}

#[test]
fn coalesce_to_a_const_ref_round_trips() {
    round_trips(
        r#"
            version 1.4
            const default_label = "fallback"
            tool p from http.get
            bridge Query.label {
                with input as i
                with output as o
                with const as c
                with p as pp
                o.label <- pp.label ?? c.default_label
            }
        "#,
    );
}

#[test]
fn force_wire_round_trips() {
    round_trips(
        r#"
            version 1.4
            tool warmup from http.get
            bridge Query.echo {
                with input as i
                with output as o
                with warmup as w
                o.label <-! w.label
            }
        "#,
    );
}

proptest! {
    /// Varies the declared field name and a numeric const value around an
    /// otherwise fixed passthrough-plus-const template; every generated
    /// value should still round-trip.
    #[test]
    fn round_trip_holds_for_varying_field_name_and_const_value(
        field in "[a-z][a-z0-9]{2,8}".prop_filter(
            "must not be a reserved keyword",
            |s| !matches!(
                s.as_str(),
                "version" | "tool" | "define" | "bridge" | "with" | "as" | "from"
                    | "input" | "output" | "context" | "const" | "on" | "error"
            ),
        ),
        n in any::<i32>(),
    ) {
        let source = format!(
            "version 1.4\nconst {field} = {n}\nbridge Query.echo {{\n    with input as i\n    with output as o\n    o.{field} <- i.{field}\n}}\n"
        );
        let first = compile(&source).expect("initial compile");
        let text = serialize(&first);
        let second = compile(&text).expect("recompile serialized source");
        prop_assert_eq!(first, second);
    }
}
