use icftl_core::{RawArg, RawFormula, RawQuantifier, RawSpecification, Scope, Type, Val};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors in the JSON specification format.
#[derive(Debug, Error)]
pub enum JsonError {
    /// Malformed JSON document.
    #[error("malformed specification document")]
    Syntax(#[from] serde_json::Error),
    /// Unknown scope name.
    #[error("unknown scope '{0}'")]
    UnknownScope(String),
    /// Unknown type name.
    #[error("unknown type '{0}' for field '{1}'")]
    UnknownType(String, String),
    /// Field references must have the form `variable.field`.
    #[error("malformed field reference '{0}'")]
    FieldReference(String),
    /// An operand where a formula is required.
    #[error("expected a formula, found {0}")]
    NotAFormula(&'static str),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    specifications: Vec<Specification>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Specification {
    name: String,
    quantifiers: Vec<Quantifier>,
    check: Option<Expr>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Quantifier {
    variable: String,
    point: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, String>,
    #[serde(default)]
    until: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Expr {
    Apply {
        op: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Field {
        field: String,
    },
    Time {
        time: String,
    },
    Duration {
        duration: (String, String),
    },
    Var {
        var: String,
    },
    Bool {
        bool: bool,
    },
    Int {
        int: i64,
    },
    Float {
        float: f64,
    },
    Str {
        str: String,
    },
    Ref {
        r#ref: u64,
    },
}

impl Expr {
    fn kind(&self) -> &'static str {
        match self {
            Expr::Apply { .. } => "an operator",
            Expr::Field { .. } => "a field reference",
            Expr::Time { .. } => "a timestamp",
            Expr::Duration { .. } => "a duration",
            Expr::Var { .. } => "a variable",
            _ => "a literal",
        }
    }

    fn into_formula(self) -> Result<RawFormula, JsonError> {
        match self {
            Expr::Apply { op, args } => Ok(RawFormula::Apply(
                op,
                args.into_iter()
                    .map(Expr::into_arg)
                    .collect::<Result<_, _>>()?,
            )),
            Expr::Bool { bool } => Ok(RawFormula::Bool(bool)),
            expr => Err(JsonError::NotAFormula(expr.kind())),
        }
    }

    fn into_arg(self) -> Result<RawArg, JsonError> {
        let arg = match self {
            Expr::Apply { .. } => RawArg::Formula(self.into_formula()?),
            Expr::Field { field } => {
                let (var, name) = field
                    .split_once('.')
                    .ok_or_else(|| JsonError::FieldReference(field.clone()))?;
                RawArg::Field(var.to_owned(), name.to_owned())
            }
            Expr::Time { time } => RawArg::Time(time),
            Expr::Duration {
                duration: (from, to),
            } => RawArg::Duration(from, to),
            Expr::Var { var } => RawArg::Variable(var),
            Expr::Bool { bool } => RawArg::Literal(Val::Boolean(bool)),
            Expr::Int { int } => RawArg::Literal(Val::Integer(int)),
            Expr::Float { float } => RawArg::Literal(Val::Float(float)),
            Expr::Str { str } => RawArg::Literal(Val::from(str)),
            Expr::Ref { r#ref } => RawArg::Literal(Val::Ref(r#ref)),
        };
        Ok(arg)
    }
}

impl TryFrom<Quantifier> for RawQuantifier {
    type Error = JsonError;

    fn try_from(value: Quantifier) -> Result<Self, Self::Error> {
        let mut quantifier = RawQuantifier::new(value.variable, value.point);
        if let Some(scope) = value.scope {
            quantifier = quantifier
                .scope(Scope::from_name(&scope).ok_or(JsonError::UnknownScope(scope))?);
        }
        for (field, ty) in value.fields {
            let ty = Type::from_name(&ty).ok_or_else(|| JsonError::UnknownType(ty, field.clone()))?;
            quantifier = quantifier.field(field, ty);
        }
        if let Some(until) = value.until {
            quantifier = quantifier.until(until);
        }
        Ok(quantifier)
    }
}

/// Parses the specifications in a JSON document.
pub fn parse(source: &str) -> Result<Vec<RawSpecification>, JsonError> {
    let document: Document = serde_json::from_str(source)?;
    document
        .specifications
        .into_iter()
        .map(|spec| {
            let mut raw = RawSpecification::new(spec.name);
            for quantifier in spec.quantifiers {
                raw = raw.forall(RawQuantifier::try_from(quantifier)?);
            }
            if let Some(check) = spec.check {
                raw = raw.check(check.into_formula()?);
            }
            Ok(raw)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use icftl_core::compile;

    #[test]
    fn positive_input() {
        let specs = parse(
            r#"{ "specifications": [ {
                "name": "positive_input",
                "quantifiers": [ { "variable": "x", "point": "enter(f)", "scope": "per-context",
                                   "fields": { "value": "int" }, "until": "exit(f)" } ],
                "check": { "op": ">", "args": [ { "field": "x.value" }, { "int": 0 } ] } } ] }"#,
        )
        .expect("parse");
        assert_eq!(specs.len(), 1);
        let spec = compile(specs.into_iter().next().expect("one")).expect("compile");
        assert_eq!(spec.until(), Some("exit(f)"));
        assert_eq!(spec.quantifiers()[0].fields[0].ty, Type::Integer);
    }

    #[test]
    fn nested_operators() {
        let specs = parse(
            r#"{ "specifications": [ {
                "name": "s",
                "quantifiers": [ { "variable": "x", "point": "enter(f)" },
                                 { "variable": "y", "point": "enter(g)", "fields": { "t": "float" } } ],
                "check": { "op": "and", "args": [
                    { "op": "before", "args": [ { "var": "x" }, { "var": "y" } ] },
                    { "op": "eventually", "args": [ { "op": "<=", "args": [ { "field": "y.t" }, { "float": 0.5 } ] } ] },
                    { "bool": true } ] } } ] }"#,
        )
        .expect("parse");
        let spec = compile(specs.into_iter().next().expect("one")).expect("compile");
        assert_eq!(spec.nodes().len(), 5);
    }

    #[test]
    fn durations() {
        let specs = parse(
            r#"{ "specifications": [ {
                "name": "fast_call",
                "quantifiers": [ { "variable": "c", "point": "enter(f)", "until": "exit(f)" },
                                 { "variable": "r", "point": "exit(f)" } ],
                "check": { "op": "<", "args": [ { "duration": ["c", "r"] }, { "float": 0.25 } ] } } ] }"#,
        )
        .expect("parse");
        let spec = compile(specs.into_iter().next().expect("one")).expect("compile");
        assert!(spec.to_string().contains("check duration(c, r) < 0.25"));
        assert!(matches!(
            parse(r#"{ "specifications": [ { "name": "s", "quantifiers": [],
                "check": { "duration": ["c", "r"] } } ] }"#),
            Err(JsonError::NotAFormula("a duration"))
        ));
    }

    #[test]
    fn errors() {
        assert!(matches!(parse("{"), Err(JsonError::Syntax(_))));
        assert!(matches!(
            parse(r#"{ "specifications": [ { "name": "s", "quantifiers": [
                { "variable": "x", "point": "p", "scope": "per-thread" } ] } ] }"#),
            Err(JsonError::UnknownScope(_))
        ));
        assert!(matches!(
            parse(r#"{ "specifications": [ { "name": "s", "quantifiers": [
                { "variable": "x", "point": "p", "fields": { "v": "integer" } } ] } ] }"#),
            Err(JsonError::UnknownType(..))
        ));
        assert!(matches!(
            parse(r#"{ "specifications": [ { "name": "s", "quantifiers": [],
                "check": { "field": "x.v" } } ] }"#),
            Err(JsonError::NotAFormula(_))
        ));
        assert!(matches!(
            parse(r#"{ "specifications": [ { "name": "s", "quantifiers": [],
                "check": { "op": "not", "args": [ { "field": "xv" } ] } } ] }"#),
            Err(JsonError::FieldReference(_))
        ));
    }
}
