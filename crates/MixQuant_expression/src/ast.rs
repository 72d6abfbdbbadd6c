// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The typed expression AST.

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
}

/// Binary operators, lowest precedence last.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `**`
    Pow,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `and`
    And,
    /// `or`
    Or,
}

/// A piece of an identifier template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Literal identifier text.
    Text(String),

    /// A `.marker.` to be substituted per cross-section; the payload is the
    /// dimension name (`crosssection` or a grouping dimension).
    Marker(String),
}

/// Built-in callable functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    /// Natural logarithm.
    Log,
    /// Exponential.
    Exp,
    /// Square root.
    Sqrt,
    /// Absolute value.
    Abs,
    /// Sine.
    Sin,
    /// Cosine.
    Cos,
    /// Tangent.
    Tan,
    /// Temporal lag.
    Lag,
    /// Temporal lead.
    Lead,
    /// Geometric carry-over.
    Adstock,
    /// Sum-preserving carry-over.
    NAdstock,
    /// Diminishing-returns saturation.
    Dimret,
    /// Sum-preserving saturation.
    NDimret,
    /// Carry-over followed by saturation.
    DimretAdstock,
    /// Sum-preserving carry-over + saturation.
    NDimretAdstock,
}

/// An expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Number(f64),

    /// String literal (a date or a dimension value).
    Str(String),

    /// Permutation slot `¬n`.
    Slot(u32),

    /// Identifier template; plain columns are single-`Text` templates.
    Template(Vec<Segment>),

    /// Unary operation.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },

    /// Binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },

    /// Built-in function call.
    Call {
        /// The function.
        function: Builtin,
        /// Arguments in source order.
        args: Vec<Expr>,
    },
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl Builtin {
    /// Resolves a call name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "log" => Some(Self::Log),
            "exp" => Some(Self::Exp),
            "sqrt" => Some(Self::Sqrt),
            "abs" => Some(Self::Abs),
            "sin" => Some(Self::Sin),
            "cos" => Some(Self::Cos),
            "tan" => Some(Self::Tan),
            "lag" => Some(Self::Lag),
            "lead" => Some(Self::Lead),
            "adstock" => Some(Self::Adstock),
            "n_adstock" => Some(Self::NAdstock),
            "dimret" => Some(Self::Dimret),
            "n_dimret" => Some(Self::NDimret),
            "dimret_adstock" => Some(Self::DimretAdstock),
            "n_dimret_adstock" => Some(Self::NDimretAdstock),
            _ => None,
        }
    }

    /// The accepted argument counts.
    #[must_use]
    pub fn arity(&self) -> std::ops::RangeInclusive<usize> {
        match self {
            Self::Log | Self::Exp | Self::Sqrt | Self::Abs | Self::Sin | Self::Cos | Self::Tan => {
                1..=1
            }
            Self::Lag | Self::Lead | Self::Adstock | Self::NAdstock => 2..=2,
            Self::Dimret | Self::NDimret => 2..=3,
            Self::DimretAdstock | Self::NDimretAdstock => 3..=4,
        }
    }

    /// The source spelling.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Exp => "exp",
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Lag => "lag",
            Self::Lead => "lead",
            Self::Adstock => "adstock",
            Self::NAdstock => "n_adstock",
            Self::Dimret => "dimret",
            Self::NDimret => "n_dimret",
            Self::DimretAdstock => "dimret_adstock",
            Self::NDimretAdstock => "n_dimret_adstock",
        }
    }
}

impl Expr {
    /// Whether any node in the tree is a permutation slot.
    #[must_use]
    pub fn has_slots(&self) -> bool {
        match self {
            Self::Slot(_) => true,
            Self::Number(_) | Self::Str(_) | Self::Template(_) => false,
            Self::Unary { operand, .. } => operand.has_slots(),
            Self::Binary { lhs, rhs, .. } => lhs.has_slots() || rhs.has_slots(),
            Self::Call { args, .. } => args.iter().any(Expr::has_slots),
        }
    }

    /// Whether any node references a `.marker.` for the given dimension.
    #[must_use]
    pub fn references_dimension(&self, dimension: &str) -> bool {
        match self {
            Self::Template(segments) => segments
                .iter()
                .any(|s| matches!(s, Segment::Marker(d) if d == dimension)),
            Self::Number(_) | Self::Str(_) | Self::Slot(_) => false,
            Self::Unary { operand, .. } => operand.references_dimension(dimension),
            Self::Binary { lhs, rhs, .. } => {
                lhs.references_dimension(dimension) || rhs.references_dimension(dimension)
            }
            Self::Call { args, .. } => args.iter().any(|a| a.references_dimension(dimension)),
        }
    }
}
