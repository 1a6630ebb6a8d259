use std::cmp::Ordering;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{Node, Token, Variant};
use crate::error::{SassError, SassResult};
use crate::functions::{Bindings, Function, FunctionRegistry};
use crate::parser::SassParser;
use crate::CompileOptions;

use std::cell::RefCell;

/// 词法链接的作用域帧。帧之间构成一条到全局帧的链，
/// 同一帧可被多个持有者共享（mixin 绑定帧会在建好后再挂接父帧）。
#[derive(Clone)]
pub struct Environment(Rc<RefCell<Frame>>);

struct Frame {
    bindings: IndexMap<Token, Node>,
    parent: Option<Environment>,
}

impl Environment {
    /// 新建一条链的根帧，即全局帧。
    pub fn new() -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: IndexMap::new(),
            parent: None,
        })))
    }

    pub fn with_parent(parent: &Environment) -> Self {
        let env = Environment::new();
        env.link(parent);
        env
    }

    pub fn link(&self, parent: &Environment) {
        self.0.borrow_mut().parent = Some(parent.clone());
    }

    /// 链上任意一帧定义了该名字即为真。
    pub fn query(&self, name: &Token) -> bool {
        let mut current = Some(self.clone());
        while let Some(env) = current {
            if env.0.borrow().bindings.contains_key(name) {
                return true;
            }
            current = env.0.borrow().parent.clone();
        }
        false
    }

    pub fn read(&self, name: &Token) -> Option<Node> {
        let mut current = Some(self.clone());
        while let Some(env) = current {
            if let Some(value) = env.0.borrow().bindings.get(name) {
                return Some(value.clone());
            }
            current = env.0.borrow().parent.clone();
        }
        None
    }

    /// 已绑定的名字在其所属帧里改绑，未绑定的落在当前帧。
    pub fn assign(&self, name: Token, value: Node) {
        let mut current = Some(self.clone());
        while let Some(env) = current {
            if env.0.borrow().bindings.contains_key(&name) {
                env.0.borrow_mut().bindings.insert(name, value);
                return;
            }
            current = env.0.borrow().parent.clone();
        }
        self.define(name, value);
    }

    /// 无视链上的同名绑定，直接写入当前帧。
    pub fn define(&self, name: Token, value: Node) {
        self.0.borrow_mut().bindings.insert(name, value);
    }

    /// 沿父链走到底就是全局帧；根帧的全局帧即自身。
    pub fn global(&self) -> Environment {
        let mut current = self.clone();
        loop {
            let parent = current.0.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => return current,
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

/// 树重写器。按节点变体分派，就地归约变量、算术、mixin 展开
/// 与选择器嵌套，产出可直接序列化的树。
pub struct Evaluator {
    functions: FunctionRegistry,
}

impl Evaluator {
    pub fn new(options: CompileOptions) -> Self {
        let _ = options;
        Self {
            functions: FunctionRegistry::with_builtins(),
        }
    }

    pub fn evaluate(&mut self, root: Node) -> SassResult<Node> {
        let globals = Environment::new();
        self.eval(&root, &Node::none(), &globals)
    }

    fn eval(&self, expr: &Node, prefix: &Node, env: &Environment) -> SassResult<Node> {
        match expr.variant() {
            Variant::Mixin => {
                env.assign(name_token(&expr.child(0)), expr.clone());
                Ok(expr.clone())
            }

            Variant::Expansion => {
                let name = name_token(&expr.child(0));
                let args = expr.child(1);
                if !env.query(&name) {
                    return Err(eval_error(
                        format!("mixin {} is undefined", name.text()),
                        expr,
                    ));
                }
                let mixin = env.read(&name).unwrap_or_else(Node::none);
                let expansion = self.apply_mixin(&mixin, &args, prefix, env)?;
                expr.pop();
                expr.pop();
                expr.splice(&expansion);
                Ok(expr.clone())
            }

            Variant::Propset => {
                self.eval(&expr.child(1), prefix, env)?;
                Ok(expr.clone())
            }

            Variant::Ruleset => {
                // 含插值的选择器先求值并重新解析
                if expr.child(0).variant() == Variant::SelectorSchema {
                    let reparsed = self.eval(&expr.child(0), prefix, env)?;
                    expr.set_child(0, reparsed);
                }
                expr.push(expand_selector(&expr.child(0), prefix));
                let expanded = expr.last_child();
                self.eval(&expr.child(1), &expanded, env)?;
                Ok(expr.clone())
            }

            Variant::SelectorSchema => {
                let mut buffer = String::new();
                for (index, child) in expr.children().iter().enumerate() {
                    let evaluated = self.eval(child, prefix, env)?;
                    expr.set_child(index, evaluated.clone());
                    if evaluated.variant() == Variant::StringConstant {
                        if let Some(token) = evaluated.token() {
                            buffer.push_str(token.unquote());
                        }
                    } else {
                        buffer.push_str(&evaluated.to_string());
                    }
                }
                // 解析器靠左花括号识别选择器结束
                buffer.push_str(" {");
                SassParser::new().parse_selector_group(&buffer, expr.path(), expr.line())
            }

            Variant::Root => {
                for child in expr.children() {
                    self.eval(&child, prefix, env)?;
                }
                Ok(expr.clone())
            }

            Variant::Block => {
                let frame = Environment::with_parent(env);
                for child in expr.children() {
                    self.eval(&child, prefix, &frame)?;
                }
                Ok(expr.clone())
            }

            Variant::Assignment => {
                let rhs = expr.child(1);
                let value = match rhs.variant() {
                    Variant::CommaList | Variant::SpaceList => {
                        for i in 0..rhs.len() {
                            let element = rhs.child(i);
                            if element.should_eval() {
                                let reduced = self.eval(&element, prefix, env)?;
                                rhs.set_child(i, reduced);
                            }
                        }
                        rhs
                    }
                    _ => self.eval(&rhs, prefix, env)?,
                };
                env.assign(name_token(&expr.child(0)), value);
                Ok(expr.clone())
            }

            Variant::Rule => {
                let rhs = expr.child(1);
                match rhs.variant() {
                    Variant::CommaList | Variant::SpaceList => {
                        for i in 0..rhs.len() {
                            let element = rhs.child(i);
                            if element.should_eval() {
                                let reduced = self.eval(&element, prefix, env)?;
                                rhs.set_child(i, reduced);
                            }
                        }
                    }
                    Variant::ValueSchema | Variant::StringSchema => {
                        self.eval(&rhs, prefix, env)?;
                    }
                    _ => {
                        if rhs.should_eval() {
                            let reduced = self.eval(&rhs, prefix, env)?;
                            expr.set_child(1, reduced);
                        }
                    }
                }
                Ok(expr.clone())
            }

            Variant::CommaList | Variant::SpaceList => {
                if expr.should_eval() {
                    let reduced = self.eval(&expr.child(0), prefix, env)?;
                    expr.set_child(0, reduced);
                }
                Ok(expr.clone())
            }

            Variant::Disjunction => {
                let mut result = Node::none();
                for child in expr.children() {
                    result = self.eval(&child, prefix, env)?;
                    if result.variant() == Variant::Boolean && !result.boolean_value() {
                        continue;
                    }
                    return Ok(result);
                }
                Ok(result)
            }

            Variant::Conjunction => {
                let mut result = Node::none();
                for child in expr.children() {
                    result = self.eval(&child, prefix, env)?;
                    if result.variant() == Variant::Boolean && !result.boolean_value() {
                        return Ok(result);
                    }
                }
                Ok(result)
            }

            Variant::Relation => {
                let lhs = self.eval(&expr.child(0), prefix, env)?;
                let op = expr.child(1);
                let rhs = self.eval(&expr.child(2), prefix, env)?;
                let truth = match op.variant() {
                    Variant::Eq => nodes_equal(&lhs, &rhs),
                    Variant::Neq => !nodes_equal(&lhs, &rhs),
                    Variant::Gt => nodes_ordering(&lhs, &rhs) == Ordering::Greater,
                    Variant::Gte => nodes_ordering(&lhs, &rhs) != Ordering::Less,
                    Variant::Lt => nodes_ordering(&lhs, &rhs) == Ordering::Less,
                    Variant::Lte => nodes_ordering(&lhs, &rhs) != Ordering::Greater,
                    _ => {
                        return Err(eval_error(
                            format!("unknown comparison operator {op}"),
                            expr,
                        ))
                    }
                };
                Ok(Node::boolean(&lhs.path_rc(), lhs.line(), truth))
            }

            Variant::Expression | Variant::Term => self.eval_operations(expr, prefix, env),

            Variant::TextualNumber => {
                let value = numeric_prefix(token_text(expr));
                Ok(Node::number(&expr.path_rc(), expr.line(), value))
            }

            Variant::TextualPercentage => {
                let value = numeric_prefix(token_text(expr));
                Ok(Node::percentage(&expr.path_rc(), expr.line(), value))
            }

            Variant::TextualDimension => {
                let text = token_text(expr);
                let split = text
                    .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+')))
                    .unwrap_or(text.len());
                let value = text[..split].parse().unwrap_or(0.0);
                Ok(Node::dimension(
                    &expr.path_rc(),
                    expr.line(),
                    value,
                    text[split..].trim(),
                ))
            }

            Variant::TextualHex => {
                let hex = token_text(expr).trim_start_matches('#');
                let (r, g, b) = if hex.len() == 6 {
                    (hex_pair(&hex[0..2]), hex_pair(&hex[2..4]), hex_pair(&hex[4..6]))
                } else {
                    let mut channels = [0.0; 3];
                    for (i, c) in hex.chars().take(3).enumerate() {
                        channels[i] = hex_doubled(c);
                    }
                    (channels[0], channels[1], channels[2])
                };
                Ok(Node::color(&expr.path_rc(), expr.line(), r, g, b, 1.0))
            }

            Variant::Variable => {
                let name = name_token(expr);
                if !env.query(&name) {
                    return Err(eval_error(
                        format!("reference to unbound variable {}", name.text()),
                        expr,
                    ));
                }
                Ok(env.read(&name).unwrap_or_else(Node::none))
            }

            Variant::FunctionCall => {
                let name = name_token(&expr.child(0));
                let args = expr.child(1);
                match self.functions.get(name.text(), args.len()) {
                    Some(function) => self.apply_function(function, &args, prefix, env),
                    // 未注册的签名按普通 CSS 函数原样输出
                    None => Ok(expr.clone()),
                }
            }

            Variant::UnaryPlus => {
                let arg = self.eval(&expr.child(0), prefix, env)?;
                if arg.is_numeric() {
                    Ok(arg)
                } else {
                    expr.set_child(0, arg);
                    Ok(expr.clone())
                }
            }

            Variant::UnaryMinus => {
                let arg = self.eval(&expr.child(0), prefix, env)?;
                if arg.is_numeric() {
                    let path = expr.path_rc();
                    Ok(match arg.variant() {
                        Variant::NumericDimension => Node::dimension(
                            &path,
                            expr.line(),
                            -arg.numeric_value(),
                            arg.unit(),
                        ),
                        Variant::NumericPercentage => {
                            Node::percentage(&path, expr.line(), -arg.numeric_value())
                        }
                        _ => Node::number(&path, expr.line(), -arg.numeric_value()),
                    })
                } else {
                    expr.set_child(0, arg);
                    Ok(expr.clone())
                }
            }

            Variant::ValueSchema | Variant::StringSchema => {
                for (index, child) in expr.children().iter().enumerate() {
                    let evaluated = self.eval(child, prefix, env)?;
                    expr.set_child(index, evaluated);
                }
                Ok(expr.clone())
            }

            Variant::CssImport => {
                let url = self.eval(&expr.child(0), prefix, env)?;
                expr.set_child(0, url);
                Ok(expr.clone())
            }

            _ => Ok(expr.clone()),
        }
    }

    /// 表达式与乘除项共用的左折叠求值。
    fn eval_operations(&self, expr: &Node, prefix: &Node, env: &Environment) -> SassResult<Node> {
        let path = expr.path_rc();
        let acc = Node::new(Variant::Expression, &path, expr.line());
        acc.push(self.eval(&expr.child(0), prefix, env)?);
        let mut i = 1;
        while i + 1 < expr.len() {
            let op = expr.child(i).variant();
            let rhs = self.eval(&expr.child(i + 1), prefix, env)?;
            accumulate(op, &acc, rhs)?;
            i += 2;
        }
        if acc.len() == 1 {
            Ok(acc.child(0))
        } else {
            Ok(acc)
        }
    }

    /// mixin 应用：绑定实参（位置 + 关键字 + 默认值），克隆主体，
    /// 在只连到全局帧的新帧里求值。
    fn apply_mixin(
        &self,
        mixin: &Node,
        args: &Node,
        prefix: &Node,
        env: &Environment,
    ) -> SassResult<Node> {
        let params = mixin.child(1);
        let body = mixin.child(2).deep_clone();
        let bindings = Environment::new();

        let mut j = 0;
        for i in 0..args.len() {
            let arg = args.child(i);
            if arg.variant() == Variant::Assignment {
                let keyword = name_token(&arg.child(0));
                let mut valid = false;
                for k in 0..params.len() {
                    let mut formal = params.child(k);
                    if formal.variant() == Variant::Assignment {
                        formal = formal.child(0);
                    }
                    if formal.token() == Some(&keyword) {
                        valid = true;
                        break;
                    }
                }
                if !valid {
                    return Err(eval_error(
                        format!(
                            "mixin {} has no parameter named {}",
                            mixin.child(0),
                            keyword.text()
                        ),
                        &arg,
                    ));
                }
                if !bindings.query(&keyword) {
                    let value = self.eval(&arg.child(1), prefix, env)?;
                    bindings.define(keyword, value);
                }
            } else {
                if j >= params.len() {
                    return Err(eval_error(
                        format!(
                            "mixin {} only takes {} argument{}",
                            mixin.child(0),
                            params.len(),
                            if params.len() == 1 { "" } else { "s" }
                        ),
                        &arg,
                    ));
                }
                let formal = params.child(j);
                let name = if formal.variant() == Variant::Variable {
                    name_token(&formal)
                } else {
                    name_token(&formal.child(0))
                };
                let value = self.eval(&arg, prefix, env)?;
                bindings.define(name, value);
                j += 1;
            }
        }

        // 默认值补洞，在调用方环境里求值
        for i in 0..params.len() {
            let formal = params.child(i);
            if formal.variant() == Variant::Assignment {
                let name = name_token(&formal.child(0));
                if !bindings.query(&name) {
                    let value = self.eval(&formal.child(1), prefix, env)?;
                    bindings.define(name, value);
                }
            }
        }

        // mixin 只看得到调用方的全局变量，不吃词法作用域
        bindings.link(&env.global());
        for i in 0..body.len() {
            let evaluated = self.eval(&body.child(i), prefix, &bindings)?;
            body.set_child(i, evaluated);
        }
        Ok(body)
    }

    fn apply_function(
        &self,
        function: &Function,
        args: &Node,
        prefix: &Node,
        env: &Environment,
    ) -> SassResult<Node> {
        let mut bindings = Bindings::new();
        let mut j = 0;
        for i in 0..args.len() {
            let arg = args.child(i);
            if arg.variant() == Variant::Assignment {
                let keyword = name_token(&arg.child(0));
                let value = self.eval(&arg.child(1), prefix, env)?;
                bindings.insert(keyword, value);
            } else {
                if j >= function.parameters.len() {
                    return Err(eval_error(
                        format!(
                            "function {} only takes {} argument{}",
                            function.name,
                            function.parameters.len(),
                            if function.parameters.len() == 1 { "" } else { "s" }
                        ),
                        &arg,
                    ));
                }
                let value = self.eval(&arg, prefix, env)?;
                bindings.insert(function.parameters[j].clone(), value);
                j += 1;
            }
        }
        function.invoke(&bindings, &args.path_rc(), args.line())
    }
}

/// 更新累加器尾元素：按操作符与两侧形态合并，合并不了的
/// 形态对直接把右操作数挂到累加器上，表达式保持未归约。
pub(crate) fn accumulate(op: Variant, acc: &Node, rhs: Node) -> SassResult<()> {
    let lhs = acc.last_child();
    let lnum = lhs.numeric_value();
    let rnum = rhs.numeric_value();
    let path = acc.path_rc();
    let line = acc.line();

    match (lhs.variant(), rhs.variant()) {
        (Variant::Number, Variant::Number) => {
            acc.pop();
            acc.push(Node::number(&path, line, operate(op, lnum, rnum)));
        }
        (Variant::Number, Variant::NumericDimension) => {
            acc.pop();
            acc.push(Node::dimension(&path, line, operate(op, lnum, rnum), rhs.unit()));
        }
        (Variant::NumericDimension, Variant::Number) => {
            acc.pop();
            acc.push(Node::dimension(&path, line, operate(op, lnum, rnum), lhs.unit()));
        }
        (Variant::NumericDimension, Variant::NumericDimension) => {
            // 除法消去单位，其余运算沿用左侧单位
            let result = if op == Variant::Div {
                Node::number(&path, line, operate(op, lnum, rnum))
            } else {
                Node::dimension(&path, line, operate(op, lnum, rnum), lhs.unit())
            };
            acc.pop();
            acc.push(result);
        }
        (Variant::Number, Variant::NumericColor) => {
            if op == Variant::Sub || op == Variant::Div {
                // 刻意不合并：挂一个零值运算符节点，再挂颜色本身
                acc.push(Node::new(op, &path, line));
                acc.push(rhs);
            } else {
                let r = operate(op, lnum, rhs.child(0).numeric_value());
                let g = operate(op, lnum, rhs.child(1).numeric_value());
                let b = operate(op, lnum, rhs.child(2).numeric_value());
                let a = rhs.child(3).numeric_value();
                acc.pop();
                acc.push(Node::color(&path, line, r, g, b, a));
            }
        }
        (Variant::NumericColor, Variant::Number) => {
            let r = operate(op, lhs.child(0).numeric_value(), rnum);
            let g = operate(op, lhs.child(1).numeric_value(), rnum);
            let b = operate(op, lhs.child(2).numeric_value(), rnum);
            let a = lhs.child(3).numeric_value();
            acc.pop();
            acc.push(Node::color(&path, line, r, g, b, a));
        }
        (Variant::NumericColor, Variant::NumericColor) => {
            if lhs.child(3).numeric_value() != rhs.child(3).numeric_value() {
                return Err(SassError::eval(
                    format!("alpha channels must be equal for {lhs} + {rhs}"),
                    lhs.path(),
                    lhs.line(),
                ));
            }
            let r = operate(op, lhs.child(0).numeric_value(), rhs.child(0).numeric_value());
            let g = operate(op, lhs.child(1).numeric_value(), rhs.child(1).numeric_value());
            let b = operate(op, lhs.child(2).numeric_value(), rhs.child(2).numeric_value());
            let a = lhs.child(3).numeric_value();
            acc.pop();
            acc.push(Node::color(&path, line, r, g, b, a));
        }
        _ => acc.push(rhs),
    }
    Ok(())
}

/// 四则运算的标量核心；其余操作符一律得 0。
pub(crate) fn operate(op: Variant, lhs: f64, rhs: f64) -> f64 {
    match op {
        Variant::Add => lhs + rhs,
        Variant::Sub => lhs - rhs,
        Variant::Mul => lhs * rhs,
        Variant::Div => lhs / rhs,
        _ => 0.0,
    }
}

/// 把内层选择器与外层前缀组合。组与组做笛卡尔积；
/// 含父引用的子树改走回填替换。
pub(crate) fn expand_selector(sel: &Node, pre: &Node) -> Node {
    if pre.variant() == Variant::None {
        return sel.clone();
    }

    let pre_is_group = pre.variant() == Variant::SelectorGroup;
    let sel_is_group = sel.variant() == Variant::SelectorGroup;

    if sel.has_backref() {
        return match (pre_is_group, sel_is_group) {
            (true, true) => {
                let group = Node::new(Variant::SelectorGroup, &sel.path_rc(), sel.line());
                for p in pre.children() {
                    for s in sel.children() {
                        group.push(expand_backref(s.deep_clone(), &p));
                    }
                }
                group
            }
            (true, false) => {
                let group = Node::new(Variant::SelectorGroup, &sel.path_rc(), sel.line());
                for p in pre.children() {
                    group.push(expand_backref(sel.deep_clone(), &p));
                }
                group
            }
            (false, true) => {
                let group = Node::new(Variant::SelectorGroup, &sel.path_rc(), sel.line());
                for s in sel.children() {
                    group.push(expand_backref(s.deep_clone(), pre));
                }
                group
            }
            (false, false) => expand_backref(sel.deep_clone(), pre),
        };
    }

    match (pre_is_group, sel_is_group) {
        (true, true) => {
            let group = Node::new(Variant::SelectorGroup, &sel.path_rc(), sel.line());
            for p in pre.children() {
                for s in sel.children() {
                    group.push(combine_selectors(&p, &s));
                }
            }
            group
        }
        (true, false) => {
            let group = Node::new(Variant::SelectorGroup, &sel.path_rc(), sel.line());
            for p in pre.children() {
                group.push(combine_selectors(&p, sel));
            }
            group
        }
        (false, true) => {
            let group = Node::new(Variant::SelectorGroup, &sel.path_rc(), sel.line());
            for s in sel.children() {
                group.push(combine_selectors(pre, &s));
            }
            group
        }
        (false, false) => combine_selectors(pre, sel),
    }
}

/// 后代组合。任一侧本身是 selector 时平铺其成分，
/// 避免越套越深的链。
fn combine_selectors(pre: &Node, sel: &Node) -> Node {
    let joined = Node::new(Variant::Selector, &sel.path_rc(), sel.line());
    if pre.variant() == Variant::Selector {
        joined.splice(pre);
    } else {
        joined.push(pre.clone());
    }
    if sel.variant() == Variant::Selector {
        joined.splice(sel);
    } else {
        joined.push(sel.clone());
    }
    joined
}

/// 把子树里的 `&` 替换成外层选择器。
pub(crate) fn expand_backref(sel: Node, pre: &Node) -> Node {
    match sel.variant() {
        Variant::Backref => pre.clone(),
        Variant::Selector | Variant::SimpleSelectorSequence => {
            for i in 0..sel.len() {
                let replaced = expand_backref(sel.child(i), pre);
                sel.set_child(i, replaced);
            }
            sel
        }
        _ => sel,
    }
}

fn eval_error<S: Into<String>>(message: S, node: &Node) -> SassError {
    SassError::eval(message, node.path(), node.line())
}

fn name_token(node: &Node) -> Token {
    node.token().cloned().unwrap_or_else(|| Token::from_str(""))
}

fn token_text(node: &Node) -> &str {
    node.token().map(Token::text).unwrap_or("")
}

fn numeric_prefix(text: &str) -> f64 {
    let end = text
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+')))
        .unwrap_or(text.len());
    text[..end].parse().unwrap_or(0.0)
}

fn hex_pair(text: &str) -> f64 {
    u8::from_str_radix(text, 16).map(f64::from).unwrap_or(0.0)
}

fn hex_doubled(digit: char) -> f64 {
    let mut pair = String::new();
    pair.push(digit);
    pair.push(digit);
    hex_pair(&pair)
}

fn nodes_equal(lhs: &Node, rhs: &Node) -> bool {
    if lhs.is_numeric() && rhs.is_numeric() {
        return lhs.numeric_value() == rhs.numeric_value();
    }
    lhs.to_string() == rhs.to_string()
}

fn nodes_ordering(lhs: &Node, rhs: &Node) -> Ordering {
    if lhs.is_numeric() && rhs.is_numeric() {
        return lhs
            .numeric_value()
            .partial_cmp(&rhs.numeric_value())
            .unwrap_or(Ordering::Equal);
    }
    lhs.to_string().cmp(&rhs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> Rc<str> {
        Rc::from("test.scss")
    }

    fn accumulator(first: Node) -> Node {
        let path = path();
        let acc = Node::new(Variant::Expression, &path, 1);
        acc.push(first);
        acc
    }

    fn sequence(parts: &[&str]) -> Node {
        let path = path();
        let node = Node::new(Variant::SimpleSelectorSequence, &path, 1);
        for part in parts {
            if *part == "&" {
                node.push(Node::new(Variant::Backref, &path, 1));
            } else {
                node.push(Node::leaf(
                    Variant::StringConstant,
                    &path,
                    1,
                    Token::from_str(part),
                ));
            }
        }
        node
    }

    fn simple(text: &str) -> Node {
        let path = path();
        Node::leaf(Variant::StringConstant, &path, 1, Token::from_str(text))
    }

    fn group(members: Vec<Node>) -> Node {
        let path = path();
        let node = Node::new(Variant::SelectorGroup, &path, 1);
        for member in members {
            node.push(member);
        }
        node
    }

    #[test]
    fn numbers_combine_under_all_operators() {
        let path = path();
        let acc = accumulator(Node::number(&path, 1, 10.0));
        accumulate(Variant::Add, &acc, Node::number(&path, 1, 4.0)).unwrap();
        accumulate(Variant::Mul, &acc, Node::number(&path, 1, 3.0)).unwrap();
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.child(0).numeric_value(), 42.0);
    }

    #[test]
    fn dimension_keeps_left_unit_except_division() {
        let path = path();
        let acc = accumulator(Node::dimension(&path, 1, 4.0, "px"));
        accumulate(Variant::Mul, &acc, Node::number(&path, 1, 2.0)).unwrap();
        let tail = acc.child(0);
        assert_eq!(tail.variant(), Variant::NumericDimension);
        assert_eq!(tail.unit(), "px");
        assert_eq!(tail.numeric_value(), 8.0);

        let acc = accumulator(Node::dimension(&path, 1, 4.0, "px"));
        accumulate(Variant::Div, &acc, Node::dimension(&path, 1, 2.0, "px")).unwrap();
        let tail = acc.child(0);
        assert_eq!(tail.variant(), Variant::Number);
        assert_eq!(tail.numeric_value(), 2.0);
    }

    #[test]
    fn colors_combine_channelwise() {
        let path = path();
        let acc = accumulator(Node::color(&path, 1, 10.0, 20.0, 30.0, 0.5));
        accumulate(
            Variant::Add,
            &acc,
            Node::color(&path, 1, 1.0, 2.0, 3.0, 0.5),
        )
        .unwrap();
        assert_eq!(acc.child(0).to_string(), "rgba(11, 22, 33, 0.5)");
    }

    #[test]
    fn color_alpha_mismatch_is_an_error() {
        let path = path();
        let acc = accumulator(Node::color(&path, 1, 10.0, 20.0, 30.0, 0.5));
        let err = accumulate(
            Variant::Add,
            &acc,
            Node::color(&path, 1, 1.0, 2.0, 3.0, 0.3),
        )
        .unwrap_err();
        assert!(err.to_string().contains("alpha channels must be equal"));
    }

    #[test]
    fn number_minus_color_does_not_combine() {
        let path = path();
        let acc = accumulator(Node::number(&path, 1, 4.0));
        accumulate(
            Variant::Sub,
            &acc,
            Node::color(&path, 1, 1.0, 2.0, 3.0, 1.0),
        )
        .unwrap();
        assert_eq!(acc.len(), 3);
        assert_eq!(acc.child(1).variant(), Variant::Sub);
        assert_eq!(acc.to_string(), "4 - #010203");
    }

    #[test]
    fn mismatched_operands_extend_the_accumulator() {
        let path = path();
        let acc = accumulator(Node::dimension(&path, 1, 4.0, "px"));
        accumulate(
            Variant::Add,
            &acc,
            Node::leaf(Variant::StringConstant, &path, 1, Token::from_str("auto")),
        )
        .unwrap();
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn expansion_arity_follows_group_sizes() {
        let pre = group(vec![simple(".a"), simple(".b")]);
        let sel = group(vec![simple(".x"), simple(".y"), simple(".z")]);
        assert_eq!(expand_selector(&sel, &pre).len(), 6);

        let pre = group(vec![simple(".a"), simple(".b")]);
        assert_eq!(expand_selector(&simple(".x"), &pre).len(), 2);

        let sel = group(vec![simple(".x"), simple(".y"), simple(".z")]);
        assert_eq!(expand_selector(&sel, &simple(".a")).len(), 3);

        let combined = expand_selector(&simple(".x"), &simple(".a"));
        assert_eq!(combined.variant(), Variant::Selector);
        assert_eq!(combined.to_string(), ".a .x");
    }

    #[test]
    fn empty_prefix_returns_selector_unchanged() {
        let sel = simple(".x");
        let expanded = expand_selector(&sel, &Node::none());
        assert_eq!(expanded.to_string(), ".x");
    }

    #[test]
    fn descendant_combination_splices_selector_components() {
        let path = path();
        let pre = Node::new(Variant::Selector, &path, 1);
        pre.push(simple(".a"));
        pre.push(simple(".b"));
        let combined = expand_selector(&simple(".x"), &pre);
        // 前缀的两个成分被平铺进新选择器，而不是嵌套
        assert_eq!(combined.len(), 3);
        assert_eq!(combined.to_string(), ".a .b .x");
    }

    #[test]
    fn backref_substitutes_the_prefix() {
        let sel = sequence(&["&", ":hover"]);
        let expanded = expand_selector(&sel, &simple(".a"));
        assert_eq!(expanded.to_string(), ".a:hover");
    }

    #[test]
    fn backref_cross_product_clones_each_pairing() {
        let sel = group(vec![sequence(&["&", ":hover"]), sequence(&["&", ":focus"])]);
        let pre = group(vec![simple(".a"), simple(".b")]);
        let expanded = expand_selector(&sel, &pre);
        assert_eq!(expanded.len(), 4);
        assert_eq!(
            expanded.to_string(),
            ".a:hover, .a:focus, .b:hover, .b:focus"
        );
    }

    #[test]
    fn assignment_rebinds_in_the_owning_frame() {
        let path = path();
        let globals = Environment::new();
        let name = Token::from_str("$x");
        globals.define(name.clone(), Node::number(&path, 1, 1.0));

        let inner = Environment::with_parent(&globals);
        inner.assign(name.clone(), Node::number(&path, 2, 2.0));
        assert_eq!(globals.read(&name).map(|n| n.numeric_value()), Some(2.0));

        let fresh = Token::from_str("$local");
        inner.assign(fresh.clone(), Node::number(&path, 3, 9.0));
        assert!(inner.query(&fresh));
        assert!(!globals.query(&fresh));
    }

    #[test]
    fn global_walks_to_the_root_frame() {
        let globals = Environment::new();
        let middle = Environment::with_parent(&globals);
        let leaf = Environment::with_parent(&middle);
        let name = Token::from_str("$g");
        globals.define(name.clone(), Node::none());
        assert!(leaf.global().query(&name));
    }
}
