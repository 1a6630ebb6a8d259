use sass_oxide::{compile, compile_file, CompileOptions};
use std::path::Path;

fn minified(source: &str) -> String {
    compile(
        source,
        CompileOptions {
            minify: true,
            ..CompileOptions::default()
        },
    )
    .unwrap()
}

#[test]
fn variable_and_nesting() {
    let src = r"$spacing: 8px;
.container {
  padding: $spacing;
  .title {
    margin-bottom: $spacing;
  }
}";
    let css = compile(src, CompileOptions::default()).unwrap();
    assert!(css.contains(".container {"));
    assert!(css.contains(".container .title {"));
    assert!(css.contains("margin-bottom: 8px"));
}

#[test]
fn minify_output() {
    let src = r".demo {
  color: #333;
  font-weight: bold;
}";
    assert_eq!(minified(src), ".demo{color:#333;font-weight:bold}");
}

#[test]
fn mixin_and_color_functions() {
    let src = r"@mixin rounded($radius) {
  border-radius: $radius;
}

.badge {
  @include rounded(4px);
  background: lighten(#123456, 15%);
}";
    let css = minified(src);
    assert!(css.contains(".badge{border-radius:4px"));
    assert!(css.contains("background:#1f5a95"));
}

#[test]
fn mixin_default_and_override() {
    let src = r"@mixin shadow($x: 0, $y: 2px, $blur: 4px) {
  box-shadow: $x $y $blur rgba(0, 0, 0, 0.4);
}

.dialog {
  @include shadow;
}

.dialog-elevated {
  @include shadow(0, 8px, 16px);
}";
    let css = minified(src);
    assert!(css.contains(".dialog{box-shadow:0 2px 4px rgba(0, 0, 0, 0.4)}"));
    assert!(css.contains(".dialog-elevated{box-shadow:0 8px 16px rgba(0, 0, 0, 0.4)}"));
}

#[test]
fn arithmetic_multiple_segments_minified() {
    let src = r"$base: 5px;
.layout {
  padding: ($base * 2) ($base * 4) ($base / 5);
}";
    let css = minified(src);
    assert!(css.contains(".layout{padding:10px 20px 1px}"));
}

#[test]
fn division_between_dimensions_drops_the_unit() {
    let src = r"$ratio: 12px / 4px;
.cell {
  flex-grow: $ratio;
}";
    let css = compile(src, CompileOptions::default()).unwrap();
    assert!(css.contains("flex-grow: 3;"));
}

#[test]
fn selector_groups_cross_multiply_with_parent_references() {
    let src = r".a, .b {
  &.active, &:focus {
    outline: none;
  }
}";
    let css = minified(src);
    assert!(css.contains(".a.active,.a:focus,.b.active,.b:focus{outline:none}"));
}

#[test]
fn nested_groups_without_parent_references_combine_as_descendants() {
    let src = r"nav, aside {
  ul, ol {
    margin: 0;
  }
}";
    let css = compile(src, CompileOptions::default()).unwrap();
    assert!(css.contains("nav ul, nav ol, aside ul, aside ol {"));
}

#[test]
fn property_namespaces_flatten_with_dashes() {
    let src = r".text {
  font: {
    family: serif;
    weight: bold;
  }
  border: {
    top: 1px solid black;
  }
}";
    let css = compile(src, CompileOptions::default()).unwrap();
    assert!(css.contains("font-family: serif"));
    assert!(css.contains("font-weight: bold"));
    assert!(css.contains("border-top: 1px solid black"));
}

#[test]
fn interpolated_selectors_are_reparsed() {
    let src = r"$state: active;
$block: card;
.#{$block}--#{$state} strong {
  color: red;
}";
    let css = compile(src, CompileOptions::default()).unwrap();
    assert!(css.contains(".card--active strong {"));
}

#[test]
fn booleans_and_comparisons_reduce() {
    let src = r"$deep: 3 < 5 and true;
$order: false or 7;
.a {
  content: $deep;
  z-index: $order;
}";
    let css = compile(src, CompileOptions::default()).unwrap();
    assert!(css.contains("content: true"));
    assert!(css.contains("z-index: 7"));
}

#[test]
fn color_arithmetic_checks_alpha() {
    let ok = r"$c: rgba(10, 20, 30, 0.5) + rgba(1, 2, 3, 0.5);
.a { color: $c; }";
    let css = compile(ok, CompileOptions::default()).unwrap();
    assert!(css.contains("rgba(11, 22, 33, 0.5)"));

    let bad = r"$c: rgba(10, 20, 30, 0.5) + rgba(1, 2, 3, 0.3);";
    let err = compile(bad, CompileOptions::default()).unwrap_err();
    assert!(err.to_string().contains("alpha channels must be equal"));
}

#[test]
fn scalar_color_arithmetic_shifts_channels() {
    let src = r"$c: #102030 + 5;
.a { color: $c; }";
    let css = compile(src, CompileOptions::default()).unwrap();
    assert!(css.contains("color: #152535"));
}

#[test]
fn errors_report_file_and_line() {
    let src = "$x: 1;\n.a {\n  color: $missing;\n}";
    let err = compile(src, CompileOptions::default()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains(":3:"));
    assert!(message.contains("unbound variable"));
}

#[test]
fn undefined_mixin_reports_its_name() {
    let err = compile(".a { @include ghost; }", CompileOptions::default()).unwrap_err();
    assert!(err.to_string().contains("mixin ghost is undefined"));
}

#[test]
fn compile_styles_base_fixture() {
    let path = Path::new("fixtures/styles/base.scss");
    let css = compile_file(
        path,
        CompileOptions {
            minify: true,
            ..CompileOptions::default()
        },
    )
    .unwrap();
    assert!(css.contains(".page{min-height:100%"));
    assert!(css.contains("background:#f5f5f5"));
    assert!(css.contains(".page-title{font-size:16px}"));
    assert!(css.contains(".page-footer .muted{color:"));
}

#[test]
fn import_cycles_are_detected() {
    let path = Path::new("fixtures/styles/cycle-a.scss");
    let err = compile_file(path, CompileOptions::default()).unwrap_err();
    assert!(err.to_string().contains("import loop detected"));
}

#[test]
fn css_imports_stay_at_the_top() {
    let src = r#"@import "https://cdn.example.com/reset.css";
body {
  color: #333;
}"#;
    let css = minified(src);
    assert!(css.starts_with("@import \"https://cdn.example.com/reset.css\";"));
    assert!(css.contains("body{color:#333}"));
}
