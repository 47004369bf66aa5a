use std::path::Path;

use alloy_dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives_v1p2p0::Bytes;
use serde_json::Value;

use crate::{AgentError, AgentResult};

/// Contract ABI used to build calldata and decode call results.
#[derive(Debug, Clone)]
pub struct Abi {
    inner: JsonAbi,
}

impl Abi {
    /// Parse a JSON ABI: either a bare array of entries or a compiler artifact
    /// carrying it under `"abi"`.
    pub fn from_json_str(json: &str) -> AgentResult<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| AgentError::AbiParse(e.to_string()))?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: Value) -> AgentResult<Self> {
        let entries = match value {
            Value::Object(mut artifact) => artifact
                .remove("abi")
                .ok_or_else(|| AgentError::AbiParse("object without an `abi` field".into()))?,
            other => other,
        };
        let inner: JsonAbi =
            serde_json::from_value(entries).map_err(|e| AgentError::AbiParse(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn from_path(path: impl AsRef<Path>) -> AgentResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgentError::AbiParse(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn json_abi(&self) -> &JsonAbi {
        &self.inner
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.inner.function(name).is_some()
    }

    /// Resolve `name`, preferring the overload whose arity matches `arity`.
    pub fn function(&self, name: &str, arity: usize) -> AgentResult<&Function> {
        let overloads = self
            .inner
            .function(name)
            .filter(|overloads| !overloads.is_empty())
            .ok_or_else(|| AgentError::FunctionNotFound(name.to_string()))?;
        Ok(overloads
            .iter()
            .find(|f| f.inputs.len() == arity)
            .unwrap_or(&overloads[0]))
    }

    /// ABI-encode a call to `function_name`, selector included.
    pub fn encode_call(&self, function_name: &str, params: &[Value]) -> AgentResult<Bytes> {
        let function = self.function(function_name, params.len())?;
        if function.inputs.len() != params.len() {
            return Err(AgentError::Encoding {
                function: function_name.to_string(),
                reason: format!(
                    "expected {} arguments, got {}",
                    function.inputs.len(),
                    params.len()
                ),
            });
        }

        let values = function
            .inputs
            .iter()
            .zip(params)
            .map(|(param, value)| {
                let ty = param.resolve().map_err(|e| AgentError::Encoding {
                    function: function_name.to_string(),
                    reason: e.to_string(),
                })?;
                coerce_value(&ty, value).map_err(|reason| AgentError::Encoding {
                    function: function_name.to_string(),
                    reason: format!("argument `{}`: {}", param.name, reason),
                })
            })
            .collect::<AgentResult<Vec<_>>>()?;

        let calldata = function
            .abi_encode_input(&values)
            .map_err(|e| AgentError::Encoding {
                function: function_name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(calldata.into())
    }

    pub fn decode_output(
        &self,
        function_name: &str,
        arity: usize,
        data: &[u8],
    ) -> AgentResult<Vec<DynSolValue>> {
        let function = self.function(function_name, arity)?;
        function
            .abi_decode_output(data)
            .map_err(|e| AgentError::Decoding {
                function: function_name.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Turn a JSON argument into a value of the declared Solidity type.
fn coerce_value(ty: &DynSolType, value: &Value) -> Result<DynSolValue, String> {
    match (ty, value) {
        (DynSolType::Array(inner), Value::Array(items)) => items
            .iter()
            .map(|item| coerce_value(inner, item))
            .collect::<Result<Vec<_>, _>>()
            .map(DynSolValue::Array),
        (DynSolType::FixedArray(inner, len), Value::Array(items)) => {
            if items.len() != *len {
                return Err(format!("expected {} elements, got {}", len, items.len()));
            }
            items
                .iter()
                .map(|item| coerce_value(inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::FixedArray)
        }
        (DynSolType::Tuple(types), Value::Array(items)) => {
            if items.len() != types.len() {
                return Err(format!(
                    "expected {} tuple fields, got {}",
                    types.len(),
                    items.len()
                ));
            }
            types
                .iter()
                .zip(items)
                .map(|(ty, item)| coerce_value(ty, item))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::Tuple)
        }
        (_, Value::String(s)) => ty.coerce_str(s).map_err(|e| e.to_string()),
        (_, Value::Number(_) | Value::Bool(_)) => {
            ty.coerce_str(&value.to_string()).map_err(|e| e.to_string())
        }
        _ => Err(format!("cannot convert {} to {}", value, ty)),
    }
}
