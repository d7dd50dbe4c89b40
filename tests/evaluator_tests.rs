use serde_json::json;
use tinja::error::ErrorKind;
use tinja::Template;

fn render(source: &str, context: serde_json::Value) -> String {
  Template::new(source, &json!({}))
    .expect("template should compile")
    .render(&context)
    .expect("render should succeed")
}

fn render_err(source: &str, context: serde_json::Value) -> tinja::TemplateError {
  Template::new(source, &json!({}))
    .expect("template should compile")
    .render(&context)
    .expect_err("render should fail")
}

#[test]
fn renders_plain_text() {
  assert_eq!(render("hello", json!({})), "hello");
}

#[test]
fn renders_simple_output() {
  assert_eq!(render("Hi {{ name }}!", json!({ "name": "Ada" })), "Hi Ada!");
}

#[test]
fn renders_if_else() {
  let t = "{% if x %}A{% else %}B{% endif %}";
  assert_eq!(render(t, json!({ "x": false })), "B");
  assert_eq!(render(t, json!({ "x": "yes" })), "A");
}

#[test]
fn renders_elif_chains() {
  let t = "{% if a %}1{% elif b %}2{% else %}3{% endif %}";
  assert_eq!(render(t, json!({ "b": true })), "2");
  assert_eq!(render(t, json!({})), "3");
}

#[test]
fn evaluates_arithmetic() {
  assert_eq!(render("{{ 2 + 3 * 4 }}", json!({})), "14");
  assert_eq!(render("{{ 7 / 2 }}", json!({})), "3.5");
  assert_eq!(render("{{ 4 / 2 }}", json!({})), "2.0");
  assert_eq!(render("{{ 7 // 2 }}", json!({})), "3");
  assert_eq!(render("{{ -7 // 2 }}", json!({})), "-4");
  assert_eq!(render("{{ 7 % 3 }}", json!({})), "1");
  assert_eq!(render("{{ 7 % -3 }}", json!({})), "-2");
  assert_eq!(render("{{ 2 ** 10 }}", json!({})), "1024");
  assert_eq!(render("{{ 2 ** -1 }}", json!({})), "0.5");
}

#[test]
fn widens_mixed_numerics_to_float() {
  assert_eq!(render("{{ 1 + 2.5 }}", json!({})), "3.5");
  assert_eq!(render("{{ 1.0 }}", json!({})), "1.0");
}

#[test]
fn concatenates_with_tilde() {
  assert_eq!(render("{{ 1 ~ 'a' ~ none }}", json!({})), "1a");
}

#[test]
fn adds_strings_and_lists() {
  assert_eq!(render("{{ 'a' + 'b' }}", json!({})), "ab");
  assert_eq!(render("{{ ([1] + [2]) | join(',') }}", json!({})), "1,2");
}

#[test]
fn short_circuit_returns_the_deciding_operand() {
  assert_eq!(render("{{ 0 or 'x' }}", json!({})), "x");
  assert_eq!(render("{{ 'a' and 'b' }}", json!({})), "b");
  // the right side is never evaluated, so the missing call cannot fail
  assert_eq!(render("{{ false and nope() }}", json!({})), "False");
}

#[test]
fn evaluates_comparisons_and_ordering() {
  assert_eq!(render("{{ 1 < 2.5 }}", json!({})), "True");
  assert_eq!(render("{{ 'a' < 'b' }}", json!({})), "True");
  assert_eq!(render("{{ 1 == 1.0 }}", json!({})), "True");

  let err = render_err("{{ 1 < 'a' }}", json!({}));
  assert_eq!(err.kind, ErrorKind::Runtime);
  assert!(err.message.contains("Cannot compare"));
}

#[test]
fn evaluates_membership() {
  assert_eq!(render("{{ 'ell' in 'hello' }}", json!({})), "True");
  assert_eq!(render("{{ 2 in [1, 2] }}", json!({})), "True");
  assert_eq!(render("{{ 'k' in m }}", json!({ "m": { "k": 1 } })), "True");
  assert_eq!(render("{{ 3 not in [1, 2] }}", json!({})), "True");
}

#[test]
fn evaluates_ternary_lazily() {
  assert_eq!(render("{{ 'a' if true else nope() }}", json!({})), "a");
  assert_eq!(render("{{ 'a' if false }}", json!({})), "");
}

#[test]
fn unbound_names_are_permissive() {
  assert_eq!(
    render("{{ nope is defined }}|{{ nope or 'x' }}", json!({})),
    "False|x"
  );
  assert_eq!(render("{{ m.nope.deeper }}", json!({ "m": {} })), "");
  assert_eq!(render("{{ xs[99] }}", json!({ "xs": [1] })), "");
}

#[test]
fn defined_test_follows_attribute_chains() {
  let ctx = json!({ "m": { "a": 1, "b": null } });
  assert_eq!(render("{{ m.a is defined }}", ctx.clone()), "True");
  assert_eq!(render("{{ m.missing is defined }}", ctx.clone()), "False");
  assert_eq!(render("{{ m.missing is not defined }}", ctx), "True");
}

#[test]
fn renders_for_with_loop_variables() {
  let t = "{% for m in xs %}{{ loop.index }}:{{ m }}{% if not loop.last %},{% endif %}{% endfor %}";
  assert_eq!(render(t, json!({ "xs": ["a", "b", "c"] })), "1:a,2:b,3:c");
}

#[test]
fn exposes_full_loop_state() {
  let t = "{% for x in [10, 20] %}{{ loop.index0 }}/{{ loop.revindex }}/{{ loop.first }}/{{ loop.last }}/{{ loop.length }};{% endfor %}";
  assert_eq!(render(t, json!({})), "0/2/True/False/2;1/1/False/True/2;");
}

#[test]
fn exposes_neighbor_items_and_cycle() {
  let t = "{% for x in [1, 2, 3] %}{{ loop.previtem is defined }}{% endfor %}";
  assert_eq!(render(t, json!({})), "FalseTrueTrue");

  let t = "{% for x in [1, 2, 3] %}{{ loop.cycle('a', 'b') }}{% endfor %}";
  assert_eq!(render(t, json!({})), "aba");
}

#[test]
fn for_else_runs_on_empty_iterables() {
  let t = "{% for x in xs %}{{ x }}{% else %}empty{% endfor %}";
  assert_eq!(render(t, json!({ "xs": [] })), "empty");
  assert_eq!(render(t, json!({ "xs": [1] })), "1");
}

#[test]
fn for_filter_keeps_matching_elements() {
  let t = "{% for x in [1, 2, 3, 4] if x % 2 == 0 %}{{ x }}{% endfor %}";
  assert_eq!(render(t, json!({})), "24");

  // a fully filtered-out iterable runs the else branch
  let t = "{% for x in [1, 3] if x % 2 == 0 %}{{ x }}{% else %}none{% endfor %}";
  assert_eq!(render(t, json!({})), "none");
}

#[test]
fn iterates_maps_in_insertion_order() {
  let t = "{% for k in m %}{{ k }}{% endfor %}";
  assert_eq!(render(t, json!({ "m": { "b": 1, "a": 2, "c": 3 } })), "bac");
}

#[test]
fn iterates_strings_by_code_point() {
  let t = "{% for c in 'abc' %}{{ c }}.{% endfor %}";
  assert_eq!(render(t, json!({})), "a.b.c.");
}

#[test]
fn unpacks_tuple_targets() {
  let t = "{% for k, v in m.items() %}{{ k }}={{ v }};{% endfor %}";
  assert_eq!(render(t, json!({ "m": { "a": 1, "b": 2 } })), "a=1;b=2;");
}

#[test]
fn reports_unpacking_mismatches() {
  let err = render_err("{% for a, b in [[1]] %}{% endfor %}", json!({}));
  assert_eq!(err.kind, ErrorKind::Runtime);
  assert!(err.message.contains("unpack"));
}

#[test]
fn reports_non_iterable_loops() {
  let err = render_err("{% for x in 42 %}{% endfor %}", json!({}));
  assert_eq!(err.kind, ErrorKind::Runtime);
  assert!(err.message.contains("Cannot iterate"));
}

#[test]
fn set_bindings_stay_in_their_scope() {
  let t = "{% set x = 1 %}{% for i in [1, 2] %}{% set x = i %}{% endfor %}{{ x }}";
  assert_eq!(render(t, json!({})), "1");
}

#[test]
fn namespace_escapes_loop_scope() {
  let t = "{% set ns = namespace(found=false) %}{% for i in [1, 2] %}{% set ns.found = true %}{% endfor %}{{ ns.found }}";
  assert_eq!(render(t, json!({})), "True");
}

#[test]
fn set_unpacks_tuples() {
  let t = "{% set a, b = 1, 2 %}{{ a }}{{ b }}";
  assert_eq!(render(t, json!({})), "12");
}

#[test]
fn block_set_captures_rendered_output() {
  let t = "{% set x %}A{{ 1 + 1 }}{% endset %}{{ x }}|{{ x }}";
  assert_eq!(render(t, json!({})), "A2|A2");
}

#[test]
fn macros_render_with_defaults_and_kwargs() {
  let t = "{% macro greet(name, punct='!') %}Hi {{ name }}{{ punct }}{% endmacro %}{{ greet('A') }}{{ greet('B', punct='?') }}";
  assert_eq!(render(t, json!({})), "Hi A!Hi B?");
}

#[test]
fn macros_capture_their_definition_environment() {
  let t = "{% set prefix = '>' %}{% macro show(x) %}{{ prefix }}{{ x }}{% endmacro %}{{ show('a') }}";
  assert_eq!(render(t, json!({})), ">a");
}

#[test]
fn macros_can_recurse_up_to_the_depth_cap() {
  let t = "{% macro count(n) %}{{ n }}{% if n > 1 %}{{ count(n - 1) }}{% endif %}{% endmacro %}{{ count(3) }}";
  assert_eq!(render(t, json!({})), "321");

  let t = "{% macro forever() %}{{ forever() }}{% endmacro %}{{ forever() }}";
  let err = render_err(t, json!({}));
  assert_eq!(err.kind, ErrorKind::Runtime);
  assert!(err.message.contains("call depth"));
}

#[test]
fn call_blocks_expose_caller() {
  let t = "{% macro wrap() %}<{{ caller() }}>{% endmacro %}{% call wrap() %}body{% endcall %}";
  assert_eq!(render(t, json!({})), "<body>");
}

#[test]
fn wrong_macro_arity_is_an_error() {
  let t = "{% macro one(a) %}{{ a }}{% endmacro %}{{ one(1, 2) }}";
  let err = render_err(t, json!({}));
  assert_eq!(err.kind, ErrorKind::Runtime);
  assert!(err.message.contains("arguments"));
}

#[test]
fn applies_string_filters() {
  assert_eq!(render("{{ 'hi' | upper }}", json!({})), "HI");
  assert_eq!(render("{{ 'HI' | lower }}", json!({})), "hi");
  assert_eq!(render("{{ 'hELLO wORLD' | capitalize }}", json!({})), "Hello world");
  assert_eq!(render("{{ 'hello world' | title }}", json!({})), "Hello World");
  assert_eq!(render("{{ '  x  ' | trim }}", json!({})), "x");
  assert_eq!(render("{{ 'a-b' | replace('-', '+') }}", json!({})), "a+b");
}

#[test]
fn default_filter_falls_back_on_none() {
  assert_eq!(render("{{ none | default('x') }}", json!({})), "x");
  assert_eq!(render("{{ 'y' | default('x') }}", json!({})), "y");
  assert_eq!(render("{{ '' | default('x', true) }}", json!({})), "x");
  assert_eq!(render("{{ missing | d('x') }}", json!({})), "x");
}

#[test]
fn applies_sequence_filters() {
  assert_eq!(render("{{ xs | length }}", json!({ "xs": [1, 2, 3] })), "3");
  assert_eq!(render("{{ 'abc' | length }}", json!({})), "3");
  assert_eq!(render("{{ xs | join(', ') }}", json!({ "xs": [1, 2] })), "1, 2");
  assert_eq!(render("{{ xs | first }}{{ xs | last }}", json!({ "xs": [1, 2, 3] })), "13");
  assert_eq!(render("{{ xs | reverse | join('') }}", json!({ "xs": [1, 2, 3] })), "321");
  assert_eq!(render("{{ xs | sort | join(',') }}", json!({ "xs": [3, 1, 2] })), "1,2,3");
  assert_eq!(render("{{ xs | sort(reverse=true) | join(',') }}", json!({ "xs": [3, 1, 2] })), "3,2,1");
  assert_eq!(render("{{ xs | unique | join(',') }}", json!({ "xs": [1, 2, 1, 3, 2] })), "1,2,3");
  assert_eq!(render("{{ xs | min }}-{{ xs | max }}-{{ xs | sum }}", json!({ "xs": [2, 4, 1] })), "1-4-7");
  assert_eq!(render("{{ 'abc' | list | join('.') }}", json!({})), "a.b.c");
}

#[test]
fn applies_projection_filters() {
  let ctx = json!({ "xs": [{ "n": 3 }, { "n": 1 }, { "n": 2 }] });
  assert_eq!(
    render("{{ xs | map(attribute='n') | join(',') }}", ctx.clone()),
    "3,1,2"
  );
  assert_eq!(
    render("{{ xs | sort(attribute='n') | map(attribute='n') | join(',') }}", ctx),
    "1,2,3"
  );
  assert_eq!(
    render("{{ ['a', 'b'] | map('upper') | join(',') }}", json!({})),
    "A,B"
  );
}

#[test]
fn applies_selection_filters() {
  assert_eq!(
    render("{{ [1, 2, 3, 4] | select('even') | join(',') }}", json!({})),
    "2,4"
  );
  assert_eq!(
    render("{{ [0, 1, '', 'a'] | select | join(',') }}", json!({})),
    "1,a"
  );
  assert_eq!(
    render("{{ [1, 2, 3, 4] | reject('even') | join(',') }}", json!({})),
    "1,3"
  );

  let ctx = json!({ "messages": [
    { "role": "system", "content": "s" },
    { "role": "user", "content": "u" },
    { "role": "user", "content": "u2" },
  ]});
  assert_eq!(
    render(
      "{{ messages | selectattr('role', 'equalto', 'user') | length }}",
      ctx.clone()
    ),
    "2"
  );
  assert_eq!(
    render(
      "{{ messages | rejectattr('role', 'equalto', 'user') | length }}",
      ctx
    ),
    "1"
  );
}

#[test]
fn converts_with_numeric_filters() {
  assert_eq!(render("{{ ('42' | int) + 1 }}", json!({})), "43");
  assert_eq!(render("{{ 'x' | int }}", json!({})), "0");
  assert_eq!(render("{{ 'x' | int(7) }}", json!({})), "7");
  assert_eq!(render("{{ 3.9 | int }}", json!({})), "3");
  assert_eq!(render("{{ '2.5' | float }}", json!({})), "2.5");
  assert_eq!(render("{{ 2.567 | round(2) }}", json!({})), "2.57");
  assert_eq!(render("{{ 2.5 | round }}", json!({})), "3.0");
  assert_eq!(render("{{ -3 | abs }}", json!({})), "3");
}

#[test]
fn tojson_matches_python_dumps_spacing() {
  assert_eq!(
    render("{{ tools | tojson }}", json!({ "tools": [{ "name": "f" }] })),
    r#"[{"name": "f"}]"#
  );
  assert_eq!(
    render("{{ m | tojson }}", json!({ "m": { "a": 1, "b": [true, null] } })),
    r#"{"a": 1, "b": [true, null]}"#
  );
  assert_eq!(
    render("{{ m | tojson(indent=2) }}", json!({ "m": { "a": [1] } })),
    "{\n  \"a\": [\n    1\n  ]\n}"
  );
  assert_eq!(render("{{ [] | tojson }}", json!({})), "[]");
}

#[test]
fn map_filters_expose_entries() {
  let ctx = json!({ "m": { "a": 1, "b": 2 } });
  assert_eq!(
    render("{% for kv in m | items %}{{ kv[0] }}{{ kv[1] }}{% endfor %}", ctx.clone()),
    "a1b2"
  );
  assert_eq!(render("{{ m | keys | join(',') }}", ctx.clone()), "a,b");
  assert_eq!(render("{{ m | values | join(',') }}", ctx), "1,2");
}

#[test]
fn safe_filter_is_the_identity() {
  assert_eq!(render("{{ '<b>' | safe }}", json!({})), "<b>");
}

#[test]
fn applies_tests() {
  assert_eq!(render("{{ 1 is odd }}", json!({})), "True");
  assert_eq!(render("{{ 2 is even }}", json!({})), "True");
  assert_eq!(render("{{ 4 is divisibleby(2) }}", json!({})), "True");
  assert_eq!(render("{{ 'a' is string }}", json!({})), "True");
  assert_eq!(render("{{ 1.5 is number }}", json!({})), "True");
  assert_eq!(render("{{ none is none }}", json!({})), "True");
  assert_eq!(render("{{ x is none }}", json!({ "x": null })), "True");
  assert_eq!(render("{{ m is mapping }}", json!({ "m": {} })), "True");
  assert_eq!(render("{{ xs is sequence }}", json!({ "xs": [] })), "True");
  assert_eq!(render("{{ 'a' is iterable }}", json!({})), "True");
  assert_eq!(render("{{ true is boolean }}", json!({})), "True");
  assert_eq!(render("{{ 1 is equalto(1.0) }}", json!({})), "True");
  assert_eq!(render("{{ 'a' is in(['a', 'b']) }}", json!({})), "True");
}

#[test]
fn calls_value_methods() {
  assert_eq!(render("{{ ' hi '.strip() }}", json!({})), "hi");
  assert_eq!(render("{{ 'abc'.startswith('ab') }}", json!({})), "True");
  assert_eq!(render("{{ 'abc'.endswith('bc') }}", json!({})), "True");
  assert_eq!(render("{{ 'a,b'.split(',') | join('-') }}", json!({})), "a-b");
  assert_eq!(render("{{ 'a b  c'.split() | length }}", json!({})), "3");
  assert_eq!(render("{{ 'aXb'.replace('X', '-') }}", json!({})), "a-b");
  assert_eq!(render("{{ m.get('a') }}{{ m.get('z', 'd') }}", json!({ "m": { "a": 1 } })), "1d");
  assert_eq!(
    render("{% for k in m.keys() %}{{ k }}{% endfor %}", json!({ "m": { "x": 1, "y": 2 } })),
    "xy"
  );

  let err = render_err("{{ 'a'.frobnicate() }}", json!({}));
  assert!(err.message.contains("Unknown method"));
}

#[test]
fn attribute_and_item_access_are_equivalent_on_maps() {
  let ctx = json!({ "m": { "a": "v" } });
  assert_eq!(render("{{ m.a }}|{{ m['a'] }}", ctx), "v|v");
}

#[test]
fn indexes_and_slices_sequences() {
  assert_eq!(render("{{ 'hello'[0] }}", json!({})), "h");
  assert_eq!(render("{{ 'hello'[-1] }}", json!({})), "o");
  assert_eq!(render("{{ 'hello'[1:3] }}", json!({})), "el");
  assert_eq!(render("{{ 'hello'[::-1] }}", json!({})), "olleh");
  assert_eq!(render("{{ xs[1] }}", json!({ "xs": [1, 2, 3] })), "2");
  assert_eq!(
    render("{{ xs[::2] | join(',') }}", json!({ "xs": [1, 2, 3, 4, 5] })),
    "1,3,5"
  );
  assert_eq!(
    render("{{ xs[1:] | join(',') }}", json!({ "xs": [1, 2, 3] })),
    "2,3"
  );
}

#[test]
fn renders_containers_in_repr_form() {
  assert_eq!(
    render("{{ [1, 'a', none, true] }}", json!({})),
    "[1, 'a', None, True]"
  );
  assert_eq!(render("{{ {'k': 'v'} }}", json!({})), "{'k': 'v'}");
  assert_eq!(render("{{ (1, 2) }}", json!({})), "[1, 2]");
}

#[test]
fn range_generates_integer_sequences() {
  assert_eq!(render("{{ range(3) | join(',') }}", json!({})), "0,1,2");
  assert_eq!(render("{{ range(1, 10, 3) | join(',') }}", json!({})), "1,4,7");
  assert_eq!(render("{{ range(3, 0, -1) | join(',') }}", json!({})), "3,2,1");

  let err = render_err("{{ range(0, 1, 0) }}", json!({}));
  assert!(err.message.contains("step"));
}

#[test]
fn dict_global_builds_maps() {
  assert_eq!(render("{{ dict(a=1, b='x') | tojson }}", json!({})), r#"{"a": 1, "b": "x"}"#);
}

#[test]
fn whitespace_markers_strip_adjacent_runs() {
  assert_eq!(render("a  {%- if true -%}  b  {%- endif %}", json!({})), "ab");
  assert_eq!(render("A\n{%- if true %}B{% endif %}", json!({})), "AB");
  assert_eq!(render("{% if true -%}  \n b{% endif %}", json!({})), "b");
  // a no-op when there is no adjacent whitespace
  assert_eq!(render("a{%- if true -%}b{%- endif -%}c", json!({})), "abc");
  assert_eq!(render("{{- 'x' -}}", json!({})), "x");
}

#[test]
fn raw_blocks_render_verbatim() {
  assert_eq!(
    render("{% raw %}{{ name }} and {% if %}{% endraw %}", json!({ "name": "x" })),
    "{{ name }} and {% if %}"
  );
}

#[test]
fn division_by_zero_is_a_runtime_error() {
  let err = render_err("{{ 1 / 0 }}", json!({}));
  assert_eq!(err.kind, ErrorKind::Runtime);
  assert!(err.message.contains("Division by zero"));

  let err = render_err("{{ 1 % 0 }}", json!({}));
  assert!(err.message.contains("Modulo by zero"));
}

#[test]
fn unknown_filters_and_tests_are_runtime_errors() {
  let err = render_err("{{ 1 | frobnicate }}", json!({}));
  assert_eq!(err.kind, ErrorKind::Runtime);
  assert!(err.message.contains("Unknown filter 'frobnicate'"));

  let err = render_err("{{ 1 is frobnicated }}", json!({}));
  assert!(err.message.contains("Unknown test 'frobnicated'"));
}

#[test]
fn raise_exception_aborts_with_the_given_message() {
  let t = "{% if messages | length == 0 %}{{ raise_exception('empty conversation') }}{% endif %}ok";
  assert_eq!(render(t, json!({ "messages": [1] })), "ok");

  let err = render_err(t, json!({ "messages": [] }));
  assert_eq!(err.kind, ErrorKind::Runtime);
  assert!(err.message.contains("empty conversation"));
}

#[test]
fn calling_non_callables_is_a_runtime_error() {
  let err = render_err("{{ missing() }}", json!({}));
  assert_eq!(err.kind, ErrorKind::Runtime);
  assert!(err.message.contains("Cannot call"));
}

#[test]
fn runtime_errors_carry_source_positions() {
  let err = render_err("line one\n{{ 1 / 0 }}", json!({}));
  assert_eq!(err.line, 2);
  assert!(err.column > 0);
}

#[test]
fn strftime_now_formats_the_clock() {
  let year = render("{{ strftime_now('%Y') }}", json!({}));
  assert_eq!(year.len(), 4);
  assert!(year.chars().all(|c| c.is_ascii_digit()));
}
