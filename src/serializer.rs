use crate::ast::{Node, Variant};
use crate::utils::{collapse_whitespace, indent};

/// 把求值后的树渲染成 CSS 文本。嵌套规则集深度优先摊平，
/// 规则集使用求值阶段追加的展开选择器。
pub struct Serializer {
    minify: bool,
}

impl Serializer {
    pub fn new(minify: bool) -> Self {
        Self { minify }
    }

    pub fn to_css(&self, root: &Node) -> String {
        let mut imports = Vec::new();
        let mut blocks = Vec::new();
        if root.variant() == Variant::Root {
            for child in root.children() {
                match child.variant() {
                    Variant::CssImport => {
                        imports.push(format!("@import {};", child.child(0)));
                    }
                    _ => self.render_statement(&child, &mut blocks),
                }
            }
        } else {
            self.render_statement(root, &mut blocks);
        }

        let mut output = String::new();
        for import in &imports {
            output.push_str(import);
            output.push('\n');
        }
        if self.minify {
            for block in &blocks {
                output.push_str(block);
            }
        } else {
            if !imports.is_empty() && !blocks.is_empty() {
                output.push('\n');
            }
            output.push_str(&blocks.join("\n\n"));
            if !blocks.is_empty() {
                output.push('\n');
            }
        }
        output
    }

    fn render_statement(&self, node: &Node, blocks: &mut Vec<String>) {
        match node.variant() {
            Variant::Ruleset => self.render_ruleset(node, blocks),
            // 顶层 mixin 展开的产物是一串平铺语句
            Variant::Expansion => {
                for child in node.children() {
                    self.render_statement(&child, blocks);
                }
            }
            _ => {}
        }
    }

    fn render_ruleset(&self, ruleset: &Node, blocks: &mut Vec<String>) {
        let selector = if ruleset.len() >= 3 {
            ruleset.last_child()
        } else {
            ruleset.child(0)
        };
        let mut declarations = Vec::new();
        let mut nested = Vec::new();
        self.collect_declarations(&ruleset.child(1), "", &mut declarations, &mut nested);

        if !declarations.is_empty() {
            blocks.push(self.format_block(&selector, &declarations));
        }
        for child in nested {
            self.render_ruleset(&child, blocks);
        }
    }

    /// 收集一个块里的声明；属性命名空间用 `-` 拼接前缀，
    /// 嵌套规则集留到外层摊平。
    fn collect_declarations(
        &self,
        block: &Node,
        prefix: &str,
        declarations: &mut Vec<String>,
        nested: &mut Vec<Node>,
    ) {
        for item in block.children() {
            match item.variant() {
                Variant::Rule => {
                    declarations.push(self.format_declaration(prefix, &item));
                }
                Variant::Propset => {
                    let name = item.child(0).to_string();
                    let joined = if prefix.is_empty() {
                        name
                    } else {
                        format!("{prefix}-{name}")
                    };
                    self.collect_declarations(&item.child(1), &joined, declarations, nested);
                }
                // mixin 展开后的子语句与块内语句同构
                Variant::Expansion => {
                    self.collect_declarations(&item, prefix, declarations, nested);
                }
                Variant::Ruleset => nested.push(item),
                _ => {}
            }
        }
    }

    fn format_declaration(&self, prefix: &str, rule: &Node) -> String {
        let name = rule.child(0).to_string();
        let name = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}-{name}")
        };
        let value = rule.child(1).to_string();
        if self.minify {
            let compact = collapse_whitespace(&value).replace(" !important", "!important");
            format!("{}:{}", name.trim(), compact)
        } else {
            format!("{}: {};", name.trim(), value.trim())
        }
    }

    fn format_block(&self, selector: &Node, declarations: &[String]) -> String {
        if self.minify {
            let mut output = String::new();
            output.push_str(&self.selector_text(selector));
            output.push('{');
            output.push_str(&declarations.join(";"));
            output.push('}');
            output
        } else {
            let mut output = String::new();
            output.push_str(&self.selector_text(selector));
            output.push_str(" {\n");
            for declaration in declarations {
                output.push_str(&indent(1));
                output.push_str(declaration);
                output.push('\n');
            }
            output.push('}');
            output
        }
    }

    fn selector_text(&self, selector: &Node) -> String {
        if !self.minify {
            return selector.to_string();
        }
        if selector.variant() == Variant::SelectorGroup {
            selector
                .children()
                .iter()
                .map(|child| collapse_whitespace(&child.to_string()))
                .collect::<Vec<_>>()
                .join(",")
        } else {
            collapse_whitespace(&selector.to_string())
        }
    }
}
