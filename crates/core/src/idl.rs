use std::{fs, path::Path};

use serde::Deserialize;

use crate::{
    coder::{classify, ArgKind},
    error::{EngineError, EngineResult},
};

/// Name of the implicit runtime account that schemas declare but callers
/// never supply.
const SYSTEM_PROGRAM_ACCOUNT: &str = "systemProgram";

/// An IDL-style schema document describing a program's instructions.
///
/// The document is consumed, not owned: it is parsed once per program and
/// read-only afterwards.
#[derive(Clone, Debug, Deserialize)]
pub struct IdlDocument {
    #[serde(default)]
    pub name: String,
    pub instructions: Vec<IdlInstruction>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IdlInstruction {
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<IdlAccount>,
    #[serde(default)]
    pub args: Vec<IdlArg>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdlAccount {
    pub name: String,
    #[serde(default)]
    pub is_signer: bool,
    #[serde(default, alias = "isMut")]
    pub is_writable: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IdlArg {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IdlType,
}

/// A declared argument type: either a scalar tag, a fixed-length array of a
/// scalar element type, or a variable-length vector of a scalar element type.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IdlType {
    Scalar(String),
    Array { array: (String, usize) },
    Vec { vec: String },
}

/// A declared account, renamed to the engine's snake_case convention.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSpec {
    pub name: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// A declared argument with its classified kind, ready for coercion and
/// encoding without further schema lookups.
#[derive(Clone, Debug, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
}

/// The resolved schema of one instruction: ordered accounts (implicit
/// runtime account excluded), ordered args with classified kinds.
#[derive(Clone, Debug, PartialEq)]
pub struct InstructionSchema {
    /// snake_case instruction name, also the discriminator input.
    pub name: String,
    pub accounts: Vec<AccountSpec>,
    pub args: Vec<ArgSpec>,
    /// True when the schema declared the implicit system program account;
    /// the builder re-appends it after the caller-supplied accounts.
    pub needs_system_program: bool,
}

impl InstructionSchema {
    pub fn signer_accounts(&self) -> Vec<&str> {
        self.accounts
            .iter()
            .filter(|a| a.is_signer)
            .map(|a| a.name.as_str())
            .collect()
    }
}

impl IdlDocument {
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> EngineResult<Self> {
        let doc: IdlDocument = serde_json::from_str(raw)?;
        Ok(doc)
    }

    /// Ordered instruction names, renamed to snake_case.
    pub fn instructions(&self) -> Vec<String> {
        self.instructions
            .iter()
            .map(|ix| camel_to_snake(&ix.name))
            .collect()
    }

    /// Resolves one instruction's accounts and args. Account and argument
    /// names are renamed from the schema's camelCase to snake_case; the
    /// rename is idempotent so already-snake names pass through unchanged.
    pub fn resolve(&self, instruction: &str) -> EngineResult<InstructionSchema> {
        let wanted = camel_to_snake(instruction);
        let declared = self
            .instructions
            .iter()
            .find(|ix| camel_to_snake(&ix.name) == wanted)
            .ok_or_else(|| EngineError::UnknownInstruction {
                program: self.name.clone(),
                instruction: instruction.to_string(),
            })?;

        let needs_system_program = declared
            .accounts
            .iter()
            .any(|a| a.name == SYSTEM_PROGRAM_ACCOUNT);

        let accounts = declared
            .accounts
            .iter()
            .filter(|a| a.name != SYSTEM_PROGRAM_ACCOUNT)
            .map(|a| AccountSpec {
                name: camel_to_snake(&a.name),
                is_signer: a.is_signer,
                is_writable: a.is_writable,
            })
            .collect();

        let args = declared
            .args
            .iter()
            .map(|arg| {
                Ok(ArgSpec {
                    name: camel_to_snake(&arg.name),
                    kind: classify(&arg.ty)?,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(InstructionSchema {
            name: wanted,
            accounts,
            args,
            needs_system_program,
        })
    }
}

/// camelCase -> snake_case: a `_` is inserted at every lowercase-or-digit to
/// uppercase boundary, then everything past the first character is
/// lowercased.
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            let prev = chars[i - 1];
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() {
                out.push('_');
            }
        }
        if i == 0 {
            out.push(c);
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}
