use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{Node, Token, Variant};
use crate::color::{self, Rgba};
use crate::error::{SassError, SassResult};

/// 形参名到实参节点的映射，按绑定顺序保存。
pub type Bindings = IndexMap<Token, Node>;

/// 内建函数的本体：拿到实参映射与调用位置，产出一个已归约的节点。
pub type Primitive = fn(&Bindings, &Rc<str>, usize) -> SassResult<Node>;

/// 以 (名字, 形参个数) 区分的内建可调用对象。
pub struct Function {
    pub name: String,
    pub parameters: Vec<Token>,
    body: Primitive,
}

impl Function {
    pub fn invoke(&self, bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
        (self.body)(bindings, path, line)
    }
}

/// 内建函数表。未注册的签名由求值器原样放行，交给下游按普通
/// CSS 函数输出。
pub struct FunctionRegistry {
    table: HashMap<(String, usize), Function>,
}

impl FunctionRegistry {
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            table: HashMap::new(),
        };
        registry.register("rgb", &["$red", "$green", "$blue"], rgb);
        registry.register("rgba", &["$red", "$green", "$blue", "$alpha"], rgba_4);
        registry.register("rgba", &["$color", "$alpha"], rgba_2);
        registry.register("red", &["$color"], red);
        registry.register("green", &["$color"], green);
        registry.register("blue", &["$color"], blue);
        registry.register("mix", &["$color-1", "$color-2"], mix_2);
        registry.register("mix", &["$color-1", "$color-2", "$weight"], mix_3);
        registry.register("lighten", &["$color", "$amount"], lighten);
        registry.register("darken", &["$color", "$amount"], darken);
        registry.register("fade", &["$color", "$amount"], fade);
        registry.register("invert", &["$color"], invert);
        registry
    }

    fn register(&mut self, name: &str, parameters: &[&str], body: Primitive) {
        let function = Function {
            name: name.to_string(),
            parameters: parameters.iter().map(|p| Token::from_str(p)).collect(),
            body,
        };
        self.table
            .insert((name.to_string(), parameters.len()), function);
    }

    pub fn get(&self, name: &str, arity: usize) -> Option<&Function> {
        self.table.get(&(name.to_string(), arity))
    }
}

fn argument<'a>(
    bindings: &'a Bindings,
    name: &str,
    function: &str,
    path: &Rc<str>,
    line: usize,
) -> SassResult<&'a Node> {
    bindings.get(&Token::from_str(name)).ok_or_else(|| {
        SassError::eval(
            format!("missing argument {name} in call to {function}"),
            path,
            line,
        )
    })
}

fn number_argument(
    bindings: &Bindings,
    name: &str,
    function: &str,
    path: &Rc<str>,
    line: usize,
) -> SassResult<f64> {
    let node = argument(bindings, name, function, path, line)?;
    if !node.is_numeric() {
        return Err(SassError::eval(
            format!("argument {name} to {function} must be numeric"),
            path,
            line,
        ));
    }
    Ok(node.numeric_value())
}

fn color_argument(
    bindings: &Bindings,
    name: &str,
    function: &str,
    path: &Rc<str>,
    line: usize,
) -> SassResult<Rgba> {
    let node = argument(bindings, name, function, path, line)?;
    if node.variant() != Variant::NumericColor {
        return Err(SassError::eval(
            format!("argument {name} to {function} must be a color"),
            path,
            line,
        ));
    }
    Ok(Rgba {
        r: node.child(0).numeric_value(),
        g: node.child(1).numeric_value(),
        b: node.child(2).numeric_value(),
        a: node.child(3).numeric_value(),
    })
}

/// 比例实参：百分比按 /100 换算，普通数值夹取到 0–1。
fn ratio_argument(
    bindings: &Bindings,
    name: &str,
    function: &str,
    path: &Rc<str>,
    line: usize,
) -> SassResult<f64> {
    let node = argument(bindings, name, function, path, line)?;
    match node.variant() {
        Variant::NumericPercentage => Ok((node.numeric_value() / 100.0).clamp(0.0, 1.0)),
        Variant::Number => Ok(node.numeric_value().clamp(0.0, 1.0)),
        _ => Err(SassError::eval(
            format!("argument {name} to {function} must be a number or percentage"),
            path,
            line,
        )),
    }
}

fn color_node(path: &Rc<str>, line: usize, rgba: Rgba) -> Node {
    let c = rgba.clamp();
    Node::color(path, line, c.r, c.g, c.b, c.a)
}

fn rgb(bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
    let r = number_argument(bindings, "$red", "rgb", path, line)?;
    let g = number_argument(bindings, "$green", "rgb", path, line)?;
    let b = number_argument(bindings, "$blue", "rgb", path, line)?;
    Ok(color_node(path, line, Rgba { r, g, b, a: 1.0 }))
}

fn rgba_4(bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
    let r = number_argument(bindings, "$red", "rgba", path, line)?;
    let g = number_argument(bindings, "$green", "rgba", path, line)?;
    let b = number_argument(bindings, "$blue", "rgba", path, line)?;
    let a = number_argument(bindings, "$alpha", "rgba", path, line)?;
    Ok(color_node(path, line, Rgba { r, g, b, a }))
}

fn rgba_2(bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
    let mut color = color_argument(bindings, "$color", "rgba", path, line)?;
    color.a = number_argument(bindings, "$alpha", "rgba", path, line)?;
    Ok(color_node(path, line, color))
}

fn red(bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
    let color = color_argument(bindings, "$color", "red", path, line)?;
    Ok(Node::number(path, line, color.r))
}

fn green(bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
    let color = color_argument(bindings, "$color", "green", path, line)?;
    Ok(Node::number(path, line, color.g))
}

fn blue(bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
    let color = color_argument(bindings, "$color", "blue", path, line)?;
    Ok(Node::number(path, line, color.b))
}

fn mix_2(bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
    let first = color_argument(bindings, "$color-1", "mix", path, line)?;
    let second = color_argument(bindings, "$color-2", "mix", path, line)?;
    Ok(color_node(path, line, color::mix(first, second, 0.5)))
}

fn mix_3(bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
    let first = color_argument(bindings, "$color-1", "mix", path, line)?;
    let second = color_argument(bindings, "$color-2", "mix", path, line)?;
    let weight = ratio_argument(bindings, "$weight", "mix", path, line)?;
    Ok(color_node(path, line, color::mix(first, second, weight)))
}

fn lighten(bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
    let color = color_argument(bindings, "$color", "lighten", path, line)?;
    let amount = ratio_argument(bindings, "$amount", "lighten", path, line)?;
    Ok(color_node(path, line, color::lighten(color, amount)))
}

fn darken(bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
    let color = color_argument(bindings, "$color", "darken", path, line)?;
    let amount = ratio_argument(bindings, "$amount", "darken", path, line)?;
    Ok(color_node(path, line, color::darken(color, amount)))
}

fn fade(bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
    let color = color_argument(bindings, "$color", "fade", path, line)?;
    let amount = ratio_argument(bindings, "$amount", "fade", path, line)?;
    Ok(color_node(path, line, color::fade(color, amount)))
}

fn invert(bindings: &Bindings, path: &Rc<str>, line: usize) -> SassResult<Node> {
    let color = color_argument(bindings, "$color", "invert", path, line)?;
    Ok(color_node(path, line, color::invert(color)))
}
