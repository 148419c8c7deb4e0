// Compiler artifacts
//
// Contracts are compiled outside the harness. This module reads the compiler
// output (ABI, creation bytecode and the build info used for verification)
// and turns constructor arguments into deployable payloads.

use std::fs;
use std::path::{Path, PathBuf};

use common::DeployError;
use ethers::abi::{Abi, Token};
use ethers::types::Bytes;
use serde::Deserialize;
use serde_json::Value;

/// Produces deployable artifacts by contract name
pub trait ContractFactory {
    fn load(&self, name: &str) -> Result<ContractArtifact, DeployError>;
}

/// Compiler input and version a contract was built with
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Short version, e.g. `0.8.27`
    pub solc_version: String,
    /// Full version including the commit, e.g. `0.8.27+commit.40a35a09`
    pub solc_long_version: String,
    /// Standard JSON compiler input
    pub input: Value,
}

/// A compiled contract ready to deploy
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub name: String,
    /// Source file the contract lives in, e.g. `contracts/NFT.sol`
    pub source_name: String,
    pub abi: Abi,
    /// Creation bytecode
    pub bytecode: Bytes,
    pub build_info: Option<BuildInfo>,
}

impl ContractArtifact {
    /// `source:Name`, the form explorers expect
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.name)
    }

    /// ABI-encode constructor arguments without the bytecode
    pub fn encode_constructor_args(&self, args: &[Token]) -> Result<Vec<u8>, DeployError> {
        match self.abi.constructor() {
            Some(constructor) => constructor
                .encode_input(Vec::new(), args)
                .map_err(|e| self.args_error(e.to_string())),
            None if args.is_empty() => Ok(Vec::new()),
            None => Err(self.args_error(format!(
                "contract has no constructor but {} argument(s) were given",
                args.len()
            ))),
        }
    }

    /// Creation payload: bytecode followed by the encoded constructor arguments
    pub fn deployment_data(&self, args: &[Token]) -> Result<Bytes, DeployError> {
        let mut data = self.bytecode.to_vec();
        data.extend(self.encode_constructor_args(args)?);
        Ok(Bytes::from(data))
    }

    fn args_error(&self, reason: String) -> DeployError {
        DeployError::ConstructorArgs {
            name: self.name.clone(),
            reason,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    contract_name: String,
    source_name: String,
    abi: Abi,
    bytecode: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDebugFile {
    build_info: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBuildInfo {
    solc_version: String,
    solc_long_version: String,
    input: Value,
}

/// Reads artifacts from a compiler output directory laid out as
/// `<root>/contracts/<Name>.sol/<Name>.json`
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        let conventional = self
            .root
            .join("contracts")
            .join(format!("{}.sol", name))
            .join(format!("{}.json", name));
        if conventional.is_file() {
            return Some(conventional);
        }
        find_artifact(&self.root, &format!("{}.json", name))
    }

    fn read_build_info(&self, artifact_path: &Path) -> Option<BuildInfo> {
        let dbg_path = artifact_path.with_extension("dbg.json");
        let dbg: RawDebugFile = serde_json::from_str(&fs::read_to_string(&dbg_path).ok()?).ok()?;
        let dir = dbg_path.parent()?;
        let raw: RawBuildInfo =
            serde_json::from_str(&fs::read_to_string(dir.join(dbg.build_info)).ok()?).ok()?;

        Some(BuildInfo {
            solc_version: raw.solc_version,
            solc_long_version: raw.solc_long_version,
            input: raw.input,
        })
    }
}

impl ContractFactory for ArtifactStore {
    fn load(&self, name: &str) -> Result<ContractArtifact, DeployError> {
        let path = self
            .locate(name)
            .ok_or_else(|| DeployError::ArtifactNotFound(name.to_string()))?;

        let invalid = |reason: String| DeployError::InvalidArtifact {
            name: name.to_string(),
            reason,
        };

        let contents = fs::read_to_string(&path).map_err(|e| invalid(e.to_string()))?;
        let raw: RawArtifact = serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;
        let bytecode = parse_bytecode(&raw.bytecode).map_err(invalid)?;

        let build_info = self.read_build_info(&path);
        if build_info.is_none() {
            log::debug!("no build info next to {}", path.display());
        }

        Ok(ContractArtifact {
            name: raw.contract_name,
            source_name: raw.source_name,
            abi: raw.abi,
            bytecode,
            build_info,
        })
    }
}

fn parse_bytecode(hex_str: &str) -> Result<Bytes, String> {
    let stripped = hex_str.trim().trim_start_matches("0x");
    if stripped.is_empty() {
        return Err("bytecode is empty (abstract contract or interface?)".to_string());
    }
    if stripped.contains("__$") {
        return Err("bytecode has unlinked library references".to_string());
    }
    hex::decode(stripped)
        .map(Bytes::from)
        .map_err(|e| format!("bytecode is not valid hex: {}", e))
}

/// Depth-first search for `<file_name>` inside a `*.sol` directory
fn find_artifact(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().map_or(false, |n| n == "build-info") {
                continue;
            }
            if let Some(found) = find_artifact(&path, file_name) {
                return Some(found);
            }
        } else if path.file_name().map_or(false, |n| n == file_name)
            && dir.extension().map_or(false, |ext| ext == "sol")
        {
            return Some(path);
        }
    }
    None
}
