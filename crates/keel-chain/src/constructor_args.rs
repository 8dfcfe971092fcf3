//! Constructor-argument encoding against the artifact ABI.
//!
//! The deploy plan supplies arguments as plain JSON values; the authoritative
//! constructor signature always comes from the compiled artifact's ABI, never
//! from the plan. A count or type mismatch is a submission-class error (a
//! caller bug, not a transient condition).

use ethers_core::abi::{Abi, ParamType, Token};
use ethers_core::types::{Bytes, U256};
use serde_json::Value;

use crate::types::{parse_address, ChainError};

/// Appends the ABI-encoded constructor arguments to the creation bytecode,
/// producing the init code submitted to the ledger.
pub fn encode_deployment(abi: &Abi, bytecode: &Bytes, args: &[Value]) -> Result<Bytes, ChainError> {
    match abi.constructor() {
        None => {
            if args.is_empty() {
                Ok(bytecode.clone())
            } else {
                Err(ChainError::Submission(format!(
                    "artifact has no constructor but {} argument(s) were supplied",
                    args.len()
                )))
            }
        }
        Some(constructor) => {
            let tokens = constructor_tokens(abi, args)?;
            let encoded = constructor
                .encode_input(bytecode.to_vec(), &tokens)
                .map_err(|error| {
                    ChainError::Submission(format!("constructor encoding failed: {error}"))
                })?;
            Ok(Bytes::from(encoded))
        }
    }
}

/// Hex encoding (no `0x` prefix) of the constructor arguments alone, as the
/// verification service expects them.
pub fn encode_constructor_args_hex(abi: &Abi, args: &[Value]) -> Result<String, ChainError> {
    if abi.constructor().is_none() {
        return Ok(String::new());
    }
    let tokens = constructor_tokens(abi, args)?;
    Ok(hex::encode(ethers_core::abi::encode(&tokens)))
}

fn constructor_tokens(abi: &Abi, args: &[Value]) -> Result<Vec<Token>, ChainError> {
    let constructor = abi
        .constructor()
        .ok_or_else(|| ChainError::Submission("artifact has no constructor".to_string()))?;
    if constructor.inputs.len() != args.len() {
        return Err(ChainError::Submission(format!(
            "constructor expects {} argument(s) but {} were supplied",
            constructor.inputs.len(),
            args.len()
        )));
    }
    constructor
        .inputs
        .iter()
        .zip(args.iter())
        .enumerate()
        .map(|(position, (input, value))| token_for_param(position, &input.kind, value))
        .collect()
}

fn token_for_param(position: usize, param: &ParamType, value: &Value) -> Result<Token, ChainError> {
    let mismatch = |expected: &str| {
        ChainError::Submission(format!(
            "constructor argument {position} does not match ABI type {param}: expected {expected}, got {value}"
        ))
    };

    match param {
        ParamType::Address => {
            let raw = value.as_str().ok_or_else(|| mismatch("address string"))?;
            let address = parse_address(raw).ok_or_else(|| mismatch("20-byte hex address"))?;
            Ok(Token::Address(address))
        }
        ParamType::String => {
            let raw = value.as_str().ok_or_else(|| mismatch("string"))?;
            Ok(Token::String(raw.to_string()))
        }
        ParamType::Bool => {
            let flag = value.as_bool().ok_or_else(|| mismatch("boolean"))?;
            Ok(Token::Bool(flag))
        }
        ParamType::Uint(_) => {
            let parsed = if let Some(number) = value.as_u64() {
                U256::from(number)
            } else if let Some(raw) = value.as_str() {
                parse_uint(raw).ok_or_else(|| mismatch("decimal or 0x-hex integer"))?
            } else {
                return Err(mismatch("unsigned integer"));
            };
            Ok(Token::Uint(parsed))
        }
        ParamType::Bytes => {
            let raw = value.as_str().ok_or_else(|| mismatch("0x-hex bytes"))?;
            let bytes = parse_hex_bytes(raw).ok_or_else(|| mismatch("0x-hex bytes"))?;
            Ok(Token::Bytes(bytes))
        }
        ParamType::FixedBytes(len) => {
            let raw = value.as_str().ok_or_else(|| mismatch("0x-hex bytes"))?;
            let bytes = parse_hex_bytes(raw).ok_or_else(|| mismatch("0x-hex bytes"))?;
            if bytes.len() != *len {
                return Err(mismatch(&format!("exactly {len} bytes")));
            }
            Ok(Token::FixedBytes(bytes))
        }
        other => Err(ChainError::Submission(format!(
            "unsupported constructor parameter type {other} at position {position}"
        ))),
    }
}

fn parse_uint(raw: &str) -> Option<U256> {
    let trimmed = raw.trim();
    if let Some(stripped) = trimmed.strip_prefix("0x") {
        U256::from_str_radix(stripped, 16).ok()
    } else {
        U256::from_dec_str(trimmed).ok()
    }
}

fn parse_hex_bytes(raw: &str) -> Option<Vec<u8>> {
    let stripped = raw.trim().strip_prefix("0x")?;
    hex::decode(stripped).ok()
}

#[cfg(test)]
mod tests {
    use ethers_core::abi::Abi;
    use ethers_core::types::Bytes;
    use serde_json::json;

    use super::{encode_constructor_args_hex, encode_deployment};
    use crate::types::ChainError;

    fn abi_with_constructor(inputs: serde_json::Value) -> Abi {
        serde_json::from_value(json!([
            {
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": inputs
            }
        ]))
        .expect("abi")
    }

    fn abi_without_constructor() -> Abi {
        serde_json::from_value(json!([])).expect("abi")
    }

    #[test]
    fn init_code_appends_encoded_arguments() {
        let abi = abi_with_constructor(json!([
            { "name": "owner", "type": "address" }
        ]));
        let bytecode = Bytes::from(vec![0x60, 0x80]);
        let args = vec![json!("0x6fc51d05be9df5d4f14ed785b993ee305eb32466")];

        let init_code = encode_deployment(&abi, &bytecode, &args).expect("encode");
        assert_eq!(init_code.len(), 2 + 32);
        assert_eq!(&init_code[0..2], &[0x60, 0x80]);
        // Address argument is left-padded into a 32-byte word.
        assert_eq!(&init_code[2..14], &[0u8; 12]);
    }

    #[test]
    fn args_hex_matches_init_code_suffix() {
        let abi = abi_with_constructor(json!([
            { "name": "name_", "type": "string" },
            { "name": "symbol_", "type": "string" }
        ]));
        let bytecode = Bytes::from(vec![0x00]);
        let args = vec![json!("NFT Market Token"), json!("NFTT")];

        let init_code = encode_deployment(&abi, &bytecode, &args).expect("encode");
        let args_hex = encode_constructor_args_hex(&abi, &args).expect("args hex");
        assert_eq!(hex::encode(&init_code[1..]), args_hex);
    }

    #[test]
    fn uint_arguments_accept_numbers_and_decimal_strings() {
        let abi = abi_with_constructor(json!([
            { "name": "cap", "type": "uint256" }
        ]));
        let bytecode = Bytes::from(vec![0x00]);

        let from_number = encode_deployment(&abi, &bytecode, &[json!(1000)]).expect("number");
        let from_string = encode_deployment(&abi, &bytecode, &[json!("1000")]).expect("string");
        assert_eq!(from_number, from_string);
    }

    #[test]
    fn argument_count_mismatch_is_a_submission_error() {
        let abi = abi_with_constructor(json!([
            { "name": "owner", "type": "address" }
        ]));
        let bytecode = Bytes::from(vec![0x00]);

        let error = encode_deployment(&abi, &bytecode, &[]).expect_err("missing argument");
        assert!(matches!(error, ChainError::Submission(reason)
            if reason.contains("expects 1 argument")));
    }

    #[test]
    fn argument_type_mismatch_is_a_submission_error() {
        let abi = abi_with_constructor(json!([
            { "name": "owner", "type": "address" }
        ]));
        let bytecode = Bytes::from(vec![0x00]);

        let error =
            encode_deployment(&abi, &bytecode, &[json!(42)]).expect_err("type mismatch");
        assert!(matches!(error, ChainError::Submission(_)));
    }

    #[test]
    fn constructorless_artifact_rejects_surplus_arguments() {
        let abi = abi_without_constructor();
        let bytecode = Bytes::from(vec![0x60]);

        assert_eq!(
            encode_deployment(&abi, &bytecode, &[]).expect("no args"),
            bytecode
        );
        assert!(encode_deployment(&abi, &bytecode, &[json!("extra")]).is_err());
        assert_eq!(
            encode_constructor_args_hex(&abi, &[]).expect("empty hex"),
            ""
        );
    }
}
