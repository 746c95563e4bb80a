use serde_json::Value;

use crate::error::Error;
use crate::tree::{Node, Operator};

/// Parses a JSON document into an expression tree. The document is either a
/// bare 2-D number array (a matrix literal) or an object of the form
/// `{"operator": "+"|"*"|"-"|"T", "operands": [...]}`, where operands are
/// themselves literals or nested operator objects.
pub fn parse_from_str(input: &str) -> Result<Node, Error> {
    let value: Value = serde_json::from_str(input)?;
    parse_tree(&value)
}

fn parse_tree(value: &Value) -> Result<Node, Error> {
    if value.is_array() {
        return parse_literal(value);
    }

    let Some(obj) = value.as_object() else {
        return Err(Error::InvalidArgument(
            "expected a 2-D array or an operator object".into(),
        ));
    };

    let operator = obj
        .get("operator")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidArgument("missing string field 'operator'".into()))?;
    let operands = obj
        .get("operands")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidArgument("missing array field 'operands'".into()))?;

    let op = match operator {
        "+" => Operator::Add,
        "*" => Operator::Multiply,
        "-" => Operator::Negate,
        "T" => Operator::Transpose,
        other => {
            return Err(Error::InvalidArgument(format!(
                "unknown operator '{other}'"
            )))
        }
    };

    let arity_ok = match op {
        Operator::Add | Operator::Multiply => operands.len() >= 2,
        Operator::Negate | Operator::Transpose => operands.len() == 1,
    };
    if !arity_ok {
        return Err(Error::InvalidArgument(format!(
            "operator '{operator}' got {} operand(s)",
            operands.len()
        )));
    }

    let children = operands.iter().map(parse_tree).collect::<Result<_, _>>()?;
    Ok(Node::operator(op, children))
}

fn parse_literal(value: &Value) -> Result<Node, Error> {
    let rows = value
        .as_array()
        .ok_or_else(|| Error::InvalidArgument("matrix literal must be an array".into()))?;

    let mut data = Vec::with_capacity(rows.len());
    for row in rows {
        let row_values = row
            .as_array()
            .ok_or_else(|| Error::InvalidArgument("matrix row must be an array".into()))?;
        let mut row_data = Vec::with_capacity(row_values.len());
        for cell in row_values {
            let number = cell
                .as_f64()
                .ok_or_else(|| Error::InvalidArgument("matrix entries must be numbers".into()))?;
            row_data.push(number);
        }
        data.push(row_data);
    }

    let width = data.first().map(Vec::len).unwrap_or(0);
    if data.iter().any(|row| row.len() != width) {
        return Err(Error::InvalidArgument(
            "matrix rows must all have the same length".into(),
        ));
    }

    Ok(Node::literal(data))
}
