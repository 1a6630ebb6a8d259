fn main() {
    // node 特性关闭时跳过 napi 侧的构建配置。
    if std::env::var_os("CARGO_FEATURE_NODE").is_some() {
        napi_build::setup();
    }
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=src/ast.rs");
    println!("cargo:rerun-if-changed=src/parser.rs");
    println!("cargo:rerun-if-changed=src/evaluator.rs");
    println!("cargo:rerun-if-changed=src/serializer.rs");
}
