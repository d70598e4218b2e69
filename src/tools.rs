//! Demo arithmetic tools served behind the OAuth layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::CallToolResult;
use crate::tool::{Tool, ToolBuilder};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddInput {
    /// First addend
    pub a: f64,
    /// Second addend
    pub b: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MultiplyInput {
    /// First factor
    pub x: f64,
    /// Second factor
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Addition {
    pub operation: &'static str,
    pub operand_a: f64,
    pub operand_b: f64,
    pub result: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Multiplication {
    pub operation: &'static str,
    pub operand_x: f64,
    pub operand_y: f64,
    pub result: f64,
    pub timestamp: String,
}

pub fn add(a: f64, b: f64) -> Addition {
    Addition {
        operation: "addition",
        operand_a: a,
        operand_b: b,
        result: a + b,
        timestamp: now(),
    }
}

pub fn multiply(x: f64, y: f64) -> Multiplication {
    Multiplication {
        operation: "multiplication",
        operand_x: x,
        operand_y: y,
        result: x * y,
        timestamp: now(),
    }
}

fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

fn structured<T: Serialize>(value: &T) -> Result<CallToolResult> {
    Ok(CallToolResult::json(serde_json::to_value(value)?))
}

/// `add_numbers(a, b)`
pub fn add_numbers() -> Result<Tool> {
    ToolBuilder::new("add_numbers")
        .description("Add two numbers together.")
        .read_only()
        .idempotent()
        .handler(|input: AddInput| async move {
            tracing::debug!(a = input.a, b = input.b, "add_numbers");
            structured(&add(input.a, input.b))
        })
        .build()
}

/// `multiply_numbers(x, y)`
pub fn multiply_numbers() -> Result<Tool> {
    ToolBuilder::new("multiply_numbers")
        .description("Multiply two numbers together.")
        .read_only()
        .idempotent()
        .handler(|input: MultiplyInput| async move {
            tracing::debug!(x = input.x, y = input.y, "multiply_numbers");
            structured(&multiply(input.x, input.y))
        })
        .build()
}

/// Every demo tool, in registration order.
pub fn all() -> Result<Vec<Tool>> {
    Ok(vec![add_numbers()?, multiply_numbers()?])
}
