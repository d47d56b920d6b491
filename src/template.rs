//! Template expression representation
//!
//! Generated documents embed logic that the home-automation platform
//! evaluates at run time (Jinja-style templates). Building those as an
//! operator/operand tree keeps the generation logic testable; rendering to
//! the target templating syntax happens only as the final serialization
//! step.

use serde_json::Value;

/// Comparison operators supported by the target templating language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    In,
}

impl CmpOp {
    fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::In => "in",
        }
    }
}

/// A template expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value rendered in the target syntax (`none`, `true`, `'str'`).
    Lit(Value),
    /// A bare identifier or variable reference.
    Ident(String),
    /// `state_attr('<entity>', '<attr>')`
    StateAttr { entity: String, attr: String },
    /// `recv.name`
    Attr(Box<Expr>, String),
    /// `recv[key]`
    Index(Box<Expr>, Box<Expr>),
    /// `name(args...)`
    Call { name: String, args: Vec<Expr> },
    /// `recv.name(args...)`
    Method {
        recv: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    /// `recv | name(args...)`
    Filter {
        recv: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    /// Dict display with expression keys, `{k: v, ...}`.
    Dict(Vec<(Expr, Expr)>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `lhs - rhs`
    Sub(Box<Expr>, Box<Expr>),
    /// `(then) if (cond) else (otherwise)`
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Lit(value.into())
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn state_attr(entity: impl Into<String>, attr: impl Into<String>) -> Self {
        Expr::StateAttr {
            entity: entity.into(),
            attr: attr.into(),
        }
    }

    pub fn attr(self, name: impl Into<String>) -> Self {
        Expr::Attr(Box::new(self), name.into())
    }

    pub fn index(self, key: Expr) -> Self {
        Expr::Index(Box::new(self), Box::new(key))
    }

    pub fn method(self, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Method {
            recv: Box::new(self),
            name: name.into(),
            args,
        }
    }

    pub fn filter(self, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Filter {
            recv: Box::new(self),
            name: name.into(),
            args,
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn eq(self, rhs: Expr) -> Self {
        Expr::Cmp {
            op: CmpOp::Eq,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn lt(self, rhs: Expr) -> Self {
        Expr::Cmp {
            op: CmpOp::Lt,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn gt(self, rhs: Expr) -> Self {
        Expr::Cmp {
            op: CmpOp::Gt,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn in_(self, rhs: Expr) -> Self {
        Expr::Cmp {
            op: CmpOp::In,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn sub(self, rhs: Expr) -> Self {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }

    pub fn if_else(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::IfElse {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// Render as a single inline template, `{{ expr }}`.
    pub fn inline(&self) -> String {
        format!("{{{{ {} }}}}", self.render())
    }

    /// Render this expression in the target templating syntax.
    pub fn render(&self) -> String {
        match self {
            Expr::Lit(value) => render_literal(value),
            Expr::Ident(name) => name.clone(),
            Expr::StateAttr { entity, attr } => {
                format!("state_attr('{entity}', '{attr}')")
            }
            Expr::Attr(recv, name) => format!("{}.{name}", self.operand(recv)),
            Expr::Index(recv, key) => {
                format!("{}[{}]", self.operand(recv), key.render())
            }
            Expr::Call { name, args } => format!("{name}({})", render_args(args)),
            Expr::Method { recv, name, args } => {
                format!("{}.{name}({})", self.operand(recv), render_args(args))
            }
            Expr::Filter { recv, name, args } => {
                if args.is_empty() {
                    format!("{} | {name}", self.operand(recv))
                } else {
                    format!("{} | {name}({})", self.operand(recv), render_args(args))
                }
            }
            Expr::Dict(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.render(), v.render()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Expr::Not(inner) => format!("not {}", self.operand(inner)),
            Expr::And(parts) => parts
                .iter()
                .map(|p| self.operand(p))
                .collect::<Vec<_>>()
                .join(" and "),
            Expr::Or(parts) => parts
                .iter()
                .map(|p| self.operand(p))
                .collect::<Vec<_>>()
                .join(" or "),
            Expr::Cmp { op, lhs, rhs } => format!(
                "{} {} {}",
                self.operand(lhs),
                op.as_str(),
                self.operand(rhs)
            ),
            Expr::Sub(lhs, rhs) => {
                format!("{} - {}", self.operand(lhs), self.operand(rhs))
            }
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => format!(
                "{} if {} else {}",
                self.operand(then),
                self.operand(cond),
                self.operand(otherwise)
            ),
        }
    }

    /// Render an operand, parenthesized when it is itself composite.
    fn operand(&self, inner: &Expr) -> String {
        let composite = matches!(
            inner,
            Expr::Not(_)
                | Expr::And(_)
                | Expr::Or(_)
                | Expr::Cmp { .. }
                | Expr::Sub(..)
                | Expr::IfElse { .. }
                | Expr::Filter { .. }
        );
        if composite {
            format!("({})", inner.render())
        } else {
            inner.render()
        }
    }
}

/// Render a JSON value as a template-language literal.
fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "none".into(),
        Value::Bool(true) => "true".into(),
        Value::Bool(false) => "false".into(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(render_literal).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("'{}': {}", k.replace('\'', "\\'"), render_literal(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

fn render_args(args: &[Expr]) -> String {
    args.iter().map(Expr::render).collect::<Vec<_>>().join(", ")
}

/// A template with optional variable bindings followed by one expression.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateProgram {
    sets: Vec<(String, Expr)>,
    body: Expr,
}

impl TemplateProgram {
    pub fn new(body: Expr) -> Self {
        Self {
            sets: Vec::new(),
            body,
        }
    }

    /// Bind `name` to `value` before the body expression.
    pub fn with_set(mut self, name: impl Into<String>, value: Expr) -> Self {
        self.sets.push((name.into(), value));
        self
    }

    /// Final serialization to the target templating syntax.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.sets {
            out.push_str(&format!("{{% set {name} = {} %}}\n", value.render()));
        }
        out.push_str(&format!("{{{{ {} }}}}", self.body.render()));
        out
    }
}
