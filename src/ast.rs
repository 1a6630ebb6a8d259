use std::cell::{Cell, RefCell};
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::color::{self, Rgba};
use crate::utils::format_number;

/// 指向共享源缓冲区的半开区间切片。token 之间按文本内容比较，
/// 因此同一段文字出现在不同缓冲区里也视为相等。
#[derive(Debug, Clone)]
pub struct Token {
    source: Rc<str>,
    start: usize,
    end: usize,
}

impl Token {
    pub fn new(source: &Rc<str>, start: usize, end: usize) -> Self {
        Self {
            source: Rc::clone(source),
            start,
            end,
        }
    }

    /// 由独立文本构造 token，内部自建缓冲区。
    pub fn from_str(text: &str) -> Self {
        let source: Rc<str> = Rc::from(text);
        let end = source.len();
        Self {
            source,
            start: 0,
            end,
        }
    }

    pub fn text(&self) -> &str {
        &self.source[self.start..self.end]
    }

    /// 剥掉一层成对引号；不成对则原样返回。
    pub fn unquote(&self) -> &str {
        let text = self.text();
        let bytes = text.as_bytes();
        if bytes.len() >= 2 {
            let first = bytes[0];
            let last = bytes[bytes.len() - 1];
            if (first == b'"' || first == b'\'') && first == last {
                return &text[1..text.len() - 1];
            }
        }
        text
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.text() == other.text()
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text().hash(state);
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// 节点变体，覆盖解析产物与求值产物两侧的全部形态（封闭集合）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    // 结构
    Root,
    Block,
    Ruleset,
    Propset,
    Rule,
    CssImport,
    // 选择器
    SelectorGroup,
    Selector,
    SimpleSelectorSequence,
    SelectorSchema,
    Backref,
    // 绑定
    Assignment,
    Variable,
    Mixin,
    Expansion,
    FunctionCall,
    // 表达式
    Expression,
    Term,
    Disjunction,
    Conjunction,
    Relation,
    UnaryPlus,
    UnaryMinus,
    // 词法字面量（未求值）
    TextualNumber,
    TextualPercentage,
    TextualDimension,
    TextualHex,
    // 求值后的字面量
    Number,
    NumericPercentage,
    NumericDimension,
    NumericColor,
    Boolean,
    StringConstant,
    // 复合字面量
    CommaList,
    SpaceList,
    ValueSchema,
    StringSchema,
    // 运算符
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    // 哨兵
    None,
}

/// 变体附带的原始负载。子节点统一放在 children 里，
/// numeric_color 的四个通道同样以子节点存放。
#[derive(Debug, Clone)]
enum Payload {
    Empty,
    Number(f64),
    Dimension { value: f64, unit: String },
    Boolean(bool),
    Token(Token),
}

#[derive(Debug)]
struct NodeData {
    variant: Variant,
    path: Rc<str>,
    line: usize,
    children: RefCell<Vec<Node>>,
    payload: Payload,
    should_eval: Cell<bool>,
    has_backref: Cell<bool>,
}

/// 树节点的共享句柄。克隆句柄共享同一份子节点存储，
/// 因此环境、树与累加器对同一节点的别名会观察到同一次修改。
#[derive(Debug, Clone)]
pub struct Node(Rc<NodeData>);

impl Node {
    fn build(variant: Variant, path: &Rc<str>, line: usize, payload: Payload) -> Node {
        Node(Rc::new(NodeData {
            variant,
            path: Rc::clone(path),
            line,
            children: RefCell::new(Vec::new()),
            payload,
            should_eval: Cell::new(false),
            has_backref: Cell::new(variant == Variant::Backref),
        }))
    }

    pub fn new(variant: Variant, path: &Rc<str>, line: usize) -> Node {
        Node::build(variant, path, line, Payload::Empty)
    }

    pub fn leaf(variant: Variant, path: &Rc<str>, line: usize, token: Token) -> Node {
        Node::build(variant, path, line, Payload::Token(token))
    }

    pub fn number(path: &Rc<str>, line: usize, value: f64) -> Node {
        Node::build(Variant::Number, path, line, Payload::Number(value))
    }

    pub fn percentage(path: &Rc<str>, line: usize, value: f64) -> Node {
        Node::build(Variant::NumericPercentage, path, line, Payload::Number(value))
    }

    pub fn dimension(path: &Rc<str>, line: usize, value: f64, unit: &str) -> Node {
        Node::build(
            Variant::NumericDimension,
            path,
            line,
            Payload::Dimension {
                value,
                unit: unit.to_string(),
            },
        )
    }

    pub fn boolean(path: &Rc<str>, line: usize, value: bool) -> Node {
        Node::build(Variant::Boolean, path, line, Payload::Boolean(value))
    }

    /// 四个数值子节点依次为红、绿、蓝、alpha。
    pub fn color(path: &Rc<str>, line: usize, r: f64, g: f64, b: f64, a: f64) -> Node {
        let node = Node::new(Variant::NumericColor, path, line);
        node.push(Node::number(path, line, r));
        node.push(Node::number(path, line, g));
        node.push(Node::number(path, line, b));
        node.push(Node::number(path, line, a));
        node
    }

    /// 哨兵节点，用作空的外层选择器前缀。
    pub fn none() -> Node {
        let path: Rc<str> = Rc::from("");
        Node::new(Variant::None, &path, 0)
    }

    pub fn variant(&self) -> Variant {
        self.0.variant
    }

    pub fn path(&self) -> &str {
        &self.0.path
    }

    pub fn path_rc(&self) -> Rc<str> {
        Rc::clone(&self.0.path)
    }

    pub fn line(&self) -> usize {
        self.0.line
    }

    pub fn token(&self) -> Option<&Token> {
        match &self.0.payload {
            Payload::Token(token) => Some(token),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.variant(),
            Variant::Number | Variant::NumericDimension | Variant::NumericPercentage
        )
    }

    /// 数值负载；非数值变体返回 0，调用方负责先判断形态。
    pub fn numeric_value(&self) -> f64 {
        match &self.0.payload {
            Payload::Number(value) => *value,
            Payload::Dimension { value, .. } => *value,
            _ => 0.0,
        }
    }

    pub fn unit(&self) -> &str {
        match &self.0.payload {
            Payload::Dimension { unit, .. } => unit,
            _ => "",
        }
    }

    pub fn boolean_value(&self) -> bool {
        matches!(self.0.payload, Payload::Boolean(true))
    }

    pub fn should_eval(&self) -> bool {
        self.0.should_eval.get()
    }

    pub fn set_should_eval(&self, value: bool) {
        self.0.should_eval.set(value);
    }

    pub fn with_eval(self) -> Node {
        self.0.should_eval.set(true);
        self
    }

    /// 选择器子树是否含有父引用。构造时逐级上传，求值阶段 O(1) 查询。
    pub fn has_backref(&self) -> bool {
        self.0.has_backref.get()
    }

    pub fn len(&self) -> usize {
        self.0.children.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.children.borrow().is_empty()
    }

    pub fn child(&self, index: usize) -> Node {
        self.0.children.borrow()[index].clone()
    }

    pub fn last_child(&self) -> Node {
        self.0
            .children
            .borrow()
            .last()
            .cloned()
            .unwrap_or_else(Node::none)
    }

    pub fn set_child(&self, index: usize, node: Node) {
        self.absorb_backref(&node);
        self.0.children.borrow_mut()[index] = node;
    }

    pub fn push(&self, node: Node) {
        self.absorb_backref(&node);
        self.0.children.borrow_mut().push(node);
    }

    /// 把另一节点的子节点平铺追加进来。
    pub fn splice(&self, other: &Node) {
        for child in other.children() {
            self.push(child);
        }
    }

    pub fn pop(&self) {
        self.0.children.borrow_mut().pop();
    }

    pub fn replace_children(&self, children: Vec<Node>) {
        for child in &children {
            self.absorb_backref(child);
        }
        *self.0.children.borrow_mut() = children;
    }

    /// 子节点句柄的快照，供迭代时避开借用冲突。
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    fn absorb_backref(&self, child: &Node) {
        if child.has_backref() {
            self.0.has_backref.set(true);
        }
    }

    /// 深拷贝子树。子节点各自独立，叶子 token 仍共享源缓冲区。
    pub fn deep_clone(&self) -> Node {
        let node = Node(Rc::new(NodeData {
            variant: self.0.variant,
            path: Rc::clone(&self.0.path),
            line: self.0.line,
            children: RefCell::new(Vec::new()),
            payload: self.0.payload.clone(),
            should_eval: Cell::new(self.0.should_eval.get()),
            has_backref: Cell::new(self.0.has_backref.get()),
        }));
        for child in self.children() {
            node.push(child.deep_clone());
        }
        node
    }

    fn rgba(&self) -> Rgba {
        Rgba {
            r: self.child(0).numeric_value(),
            g: self.child(1).numeric_value(),
            b: self.child(2).numeric_value(),
            a: self.child(3).numeric_value(),
        }
    }

    fn join_children(&self, f: &mut fmt::Formatter<'_>, separator: &str) -> fmt::Result {
        for (index, child) in self.children().iter().enumerate() {
            if index > 0 {
                f.write_str(separator)?;
            }
            write!(f, "{child}")?;
        }
        Ok(())
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant() {
            Variant::Number => f.write_str(&format_number(self.numeric_value())),
            Variant::NumericPercentage => {
                write!(f, "{}%", format_number(self.numeric_value()))
            }
            Variant::NumericDimension => {
                write!(f, "{}{}", format_number(self.numeric_value()), self.unit())
            }
            Variant::NumericColor => {
                let rgba = self.rgba();
                if (rgba.a - 1.0).abs() < f64::EPSILON {
                    f.write_str(&color::format_hex(rgba))
                } else {
                    f.write_str(&color::format_rgba(rgba))
                }
            }
            Variant::Boolean => {
                f.write_str(if self.boolean_value() { "true" } else { "false" })
            }
            Variant::StringConstant
            | Variant::Variable
            | Variant::TextualNumber
            | Variant::TextualPercentage
            | Variant::TextualDimension
            | Variant::TextualHex => match self.token() {
                Some(token) => f.write_str(token.text()),
                None => Ok(()),
            },
            Variant::Backref => f.write_str("&"),
            Variant::CommaList => self.join_children(f, ", "),
            Variant::SpaceList | Variant::Expression | Variant::Term | Variant::Relation => {
                self.join_children(f, " ")
            }
            Variant::Disjunction => self.join_children(f, " or "),
            Variant::Conjunction => self.join_children(f, " and "),
            Variant::UnaryPlus => write!(f, "+{}", self.child(0)),
            Variant::UnaryMinus => write!(f, "-{}", self.child(0)),
            Variant::Assignment => write!(f, "{}: {}", self.child(0), self.child(1)),
            Variant::FunctionCall => {
                write!(f, "{}(", self.child(0))?;
                self.child(1).join_children(f, ", ")?;
                f.write_str(")")
            }
            Variant::SelectorGroup => self.join_children(f, ", "),
            Variant::Selector => self.join_children(f, " "),
            Variant::SimpleSelectorSequence
            | Variant::SelectorSchema
            | Variant::ValueSchema
            | Variant::StringSchema => self.join_children(f, ""),
            Variant::Add => f.write_str("+"),
            Variant::Sub => f.write_str("-"),
            Variant::Mul => f.write_str("*"),
            Variant::Div => f.write_str("/"),
            Variant::Eq => f.write_str("=="),
            Variant::Neq => f.write_str("!="),
            Variant::Gt => f.write_str(">"),
            Variant::Gte => f.write_str(">="),
            Variant::Lt => f.write_str("<"),
            Variant::Lte => f.write_str("<="),
            Variant::None => Ok(()),
            _ => self.join_children(f, " "),
        }
    }
}
