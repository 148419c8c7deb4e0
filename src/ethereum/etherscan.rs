use std::time::Duration;

use async_trait::async_trait;
use common::{VerificationOutcome, VerificationRequest, VerifyError};
use ethers::types::Address;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::VerificationService;
use crate::artifacts::{BuildInfo, ContractArtifact, ContractFactory};
use crate::context::ExplorerEndpoint;

const PENDING: &str = "Pending in queue";
const PASS: &str = "Pass - Verified";
const ALREADY_VERIFIED: &str = "already verified";
const BYTECODE_NOT_INDEXED: &str = "Unable to locate ContractCode";

/// Etherscan-compatible explorer client that verifies contract sources
pub struct EtherscanVerifier<F> {
    endpoint: ExplorerEndpoint,
    compiler_version: String,
    artifacts: F,
    client: Client,
    poll_interval: Duration,
    max_polls: usize,
    max_submissions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: Value,
}

impl EtherscanResponse {
    fn is_ok(&self) -> bool {
        self.status == "1"
    }

    /// `result` as text; explorers put error details there on failure
    fn result_text(&self) -> String {
        match &self.result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Result of submitting sources
enum Submission {
    Queued(String),
    AlreadyVerified,
}

impl<F: ContractFactory + Send + Sync> EtherscanVerifier<F> {
    /// Create a verifier for `endpoint`, loading sources through `artifacts`
    pub fn new(
        endpoint: ExplorerEndpoint,
        compiler_version: &str,
        artifacts: F,
    ) -> Result<Self, VerifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VerifyError::Service(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            compiler_version: compiler_version.to_string(),
            artifacts,
            client,
            poll_interval: Duration::from_secs(3),
            max_polls: 20,
            max_submissions: 5,
        })
    }

    /// Override how often and how many times the explorer is asked for a result
    pub fn with_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    /// Browser link for a verified contract
    pub fn contract_url(&self, address: Address) -> String {
        self.endpoint.address_url(&format!("{:?}", address))
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<EtherscanResponse, VerifyError> {
        let response = self
            .client
            .get(&self.endpoint.api_url)
            .query(params)
            .query(&[("apikey", self.endpoint.api_key.as_str())])
            .send()
            .await
            .map_err(|e| VerifyError::Service(e.to_string()))?;
        Self::parse(response).await
    }

    async fn parse(response: reqwest::Response) -> Result<EtherscanResponse, VerifyError> {
        if !response.status().is_success() {
            return Err(VerifyError::Service(format!(
                "explorer API request failed: {}",
                response.status()
            )));
        }
        let text = response
            .text()
            .await
            .map_err(|e| VerifyError::Service(e.to_string()))?;
        serde_json::from_str(&text)
            .map_err(|_| VerifyError::Service(format!("unexpected explorer response: {}", text)))
    }

    /// Whether the explorer already has source for `address`
    async fn is_verified(&self, address: Address) -> Result<bool, VerifyError> {
        let address = format!("{:?}", address);
        let response = self
            .get(&[
                ("module", "contract"),
                ("action", "getsourcecode"),
                ("address", address.as_str()),
            ])
            .await?;

        if !response.is_ok() {
            log::debug!(
                "getsourcecode for {}: {} ({})",
                address,
                response.message,
                response.result_text()
            );
            return Ok(false);
        }

        let has_source = response
            .result
            .get(0)
            .and_then(|entry| entry.get("SourceCode"))
            .and_then(Value::as_str)
            .map_or(false, |source| !source.is_empty());
        Ok(has_source)
    }

    async fn submit(
        &self,
        artifact: &ContractArtifact,
        build_info: &BuildInfo,
        address: Address,
        constructor_args: &str,
    ) -> Result<Submission, VerifyError> {
        let address = format!("{:?}", address);
        let source = build_info.input.to_string();
        let contract_name = artifact.fully_qualified_name();
        let compiler_version = format!("v{}", build_info.solc_long_version);

        for attempt in 1..=self.max_submissions {
            let form = [
                ("apikey", self.endpoint.api_key.as_str()),
                ("module", "contract"),
                ("action", "verifysourcecode"),
                ("contractaddress", address.as_str()),
                ("sourceCode", source.as_str()),
                ("codeformat", "solidity-standard-json-input"),
                ("contractname", contract_name.as_str()),
                ("compilerversion", compiler_version.as_str()),
                // Field name is misspelled in the Etherscan API
                ("constructorArguements", constructor_args),
            ];

            let response = self
                .client
                .post(&self.endpoint.api_url)
                .form(&form)
                .send()
                .await
                .map_err(|e| VerifyError::Service(e.to_string()))?;
            let response = Self::parse(response).await?;
            let result = response.result_text();

            if response.is_ok() {
                return Ok(Submission::Queued(result));
            }
            if result.to_lowercase().contains(ALREADY_VERIFIED) {
                return Ok(Submission::AlreadyVerified);
            }
            if result.contains(BYTECODE_NOT_INDEXED) && attempt < self.max_submissions {
                log::info!(
                    "explorer has not indexed {} yet, retrying ({}/{})",
                    address,
                    attempt,
                    self.max_submissions
                );
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            return Err(VerifyError::Rejected(result));
        }

        Err(VerifyError::Rejected(format!(
            "explorer never indexed bytecode at {}",
            address
        )))
    }

    async fn poll_status(&self, guid: &str) -> Result<VerificationOutcome, VerifyError> {
        for _ in 0..self.max_polls {
            let response = self
                .get(&[
                    ("module", "contract"),
                    ("action", "checkverifystatus"),
                    ("guid", guid),
                ])
                .await?;
            let result = response.result_text();

            if result.contains(PENDING) {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            if result.contains(PASS) {
                return Ok(VerificationOutcome::Verified {
                    guid: guid.to_string(),
                });
            }
            if result.to_lowercase().contains(ALREADY_VERIFIED) {
                return Ok(VerificationOutcome::AlreadyVerified);
            }
            return Err(VerifyError::Rejected(result));
        }

        Err(VerifyError::Service(format!(
            "verification {} still pending after {} checks",
            guid, self.max_polls
        )))
    }
}

#[async_trait]
impl<F: ContractFactory + Send + Sync> VerificationService for EtherscanVerifier<F> {
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationOutcome, VerifyError> {
        if self.is_verified(request.address).await? {
            return Ok(VerificationOutcome::AlreadyVerified);
        }

        let artifact = self
            .artifacts
            .load(&request.contract_name)
            .map_err(|e| VerifyError::Artifact(e.to_string()))?;
        let build_info = artifact.build_info.as_ref().ok_or_else(|| {
            VerifyError::Artifact(format!("no build info for `{}`", request.contract_name))
        })?;

        if build_info.solc_version != self.compiler_version {
            return Err(VerifyError::CompilerMismatch {
                configured: self.compiler_version.clone(),
                artifact: build_info.solc_long_version.clone(),
            });
        }

        let encoded_args = artifact
            .encode_constructor_args(&request.constructor_args)
            .map_err(|e| VerifyError::Artifact(e.to_string()))?;

        match self
            .submit(&artifact, build_info, request.address, &hex::encode(encoded_args))
            .await?
        {
            Submission::AlreadyVerified => Ok(VerificationOutcome::AlreadyVerified),
            Submission::Queued(guid) => {
                log::info!("{} submitted for verification (guid {})", request.contract_name, guid);
                self.poll_status(&guid).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::tests::{write_artifact, NFT_ABI};
    use crate::artifacts::ArtifactStore;
    use ethers::abi::Token;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn marketplace() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn token() -> Address {
        Address::repeat_byte(0xbb)
    }

    fn verifier(server: &ServerGuard, artifacts: &TempDir, solidity: &str) -> EtherscanVerifier<ArtifactStore> {
        let endpoint = ExplorerEndpoint {
            api_url: format!("{}/api", server.url()),
            browser_url: "https://testnet.snowtrace.io".to_string(),
            api_key: "snowtrace".to_string(),
        };
        EtherscanVerifier::new(endpoint, solidity, ArtifactStore::new(artifacts.path()))
            .unwrap()
            .with_polling(Duration::from_millis(1), 3)
    }

    fn artifacts() -> TempDir {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), "NFT", NFT_ABI, "0x6080");
        write_artifact(dir.path(), "NFTMarket", "[]", "0x6080");
        dir
    }

    fn source_code(source: &str) -> String {
        json!({ "status": "1", "message": "OK", "result": [{ "SourceCode": source }] }).to_string()
    }

    fn action(name: &str) -> Matcher {
        Matcher::UrlEncoded("action".into(), name.into())
    }

    #[tokio::test]
    async fn test_already_verified_skips_submission() {
        let mut server = Server::new_async().await;
        let lookup = server
            .mock("GET", "/api")
            .match_query(action("getsourcecode"))
            .with_body(source_code("pragma solidity 0.8.27;"))
            .create_async()
            .await;
        let submit = server
            .mock("POST", "/api")
            .expect(0)
            .create_async()
            .await;

        let dir = artifacts();
        let outcome = verifier(&server, &dir, "0.8.27")
            .verify(&VerificationRequest::new("NFTMarket", marketplace(), vec![]))
            .await
            .unwrap();

        assert_eq!(outcome, VerificationOutcome::AlreadyVerified);
        lookup.assert_async().await;
        submit.assert_async().await;
    }

    #[tokio::test]
    async fn test_submits_encoded_constructor_args_and_polls() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api")
            .match_query(action("getsourcecode"))
            .with_body(source_code(""))
            .create_async()
            .await;

        let expected_args = format!("{:0>64}", hex::encode(marketplace().as_bytes()));
        let submit = server
            .mock("POST", "/api")
            .match_body(Matcher::AllOf(vec![
                action("verifysourcecode"),
                Matcher::UrlEncoded("contractname".into(), "contracts/NFT.sol:NFT".into()),
                Matcher::UrlEncoded("compilerversion".into(), "v0.8.27+commit.40a35a09".into()),
                Matcher::UrlEncoded("constructorArguements".into(), expected_args),
                Matcher::UrlEncoded("codeformat".into(), "solidity-standard-json-input".into()),
            ]))
            .with_body(json!({ "status": "1", "message": "OK", "result": "guid-123" }).to_string())
            .create_async()
            .await;
        let status = server
            .mock("GET", "/api")
            .match_query(Matcher::AllOf(vec![
                action("checkverifystatus"),
                Matcher::UrlEncoded("guid".into(), "guid-123".into()),
            ]))
            .with_body(json!({ "status": "1", "message": "OK", "result": PASS }).to_string())
            .create_async()
            .await;

        let dir = artifacts();
        let request = VerificationRequest::new("NFT", token(), vec![Token::Address(marketplace())]);
        let outcome = verifier(&server, &dir, "0.8.27").verify(&request).await.unwrap();

        assert_eq!(
            outcome,
            VerificationOutcome::Verified {
                guid: "guid-123".to_string()
            }
        );
        submit.assert_async().await;
        status.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_submission() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api")
            .match_query(action("getsourcecode"))
            .with_body(source_code(""))
            .create_async()
            .await;
        server
            .mock("POST", "/api")
            .with_body(
                json!({ "status": "0", "message": "NOTOK", "result": "Fail - Unable to verify" })
                    .to_string(),
            )
            .create_async()
            .await;

        let dir = artifacts();
        let err = verifier(&server, &dir, "0.8.27")
            .verify(&VerificationRequest::new("NFTMarket", marketplace(), vec![]))
            .await
            .unwrap_err();

        assert_eq!(err, VerifyError::Rejected("Fail - Unable to verify".to_string()));
    }

    #[tokio::test]
    async fn test_pending_forever_gives_up() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api")
            .match_query(action("getsourcecode"))
            .with_body(source_code(""))
            .create_async()
            .await;
        server
            .mock("POST", "/api")
            .with_body(json!({ "status": "1", "message": "OK", "result": "guid-9" }).to_string())
            .create_async()
            .await;
        let status = server
            .mock("GET", "/api")
            .match_query(action("checkverifystatus"))
            .with_body(json!({ "status": "0", "message": "NOTOK", "result": PENDING }).to_string())
            .expect(3)
            .create_async()
            .await;

        let dir = artifacts();
        let err = verifier(&server, &dir, "0.8.27")
            .verify(&VerificationRequest::new("NFTMarket", marketplace(), vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, VerifyError::Service(msg) if msg.contains("still pending")));
        status.assert_async().await;
    }

    #[tokio::test]
    async fn test_compiler_mismatch_is_not_submitted() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api")
            .match_query(action("getsourcecode"))
            .with_body(source_code(""))
            .create_async()
            .await;
        let submit = server.mock("POST", "/api").expect(0).create_async().await;

        let dir = artifacts();
        let err = verifier(&server, &dir, "0.8.20")
            .verify(&VerificationRequest::new("NFTMarket", marketplace(), vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, VerifyError::CompilerMismatch { .. }));
        submit.assert_async().await;
    }

    #[tokio::test]
    async fn test_explorer_outage() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api")
            .with_status(503)
            .create_async()
            .await;

        let dir = artifacts();
        let err = verifier(&server, &dir, "0.8.27")
            .verify(&VerificationRequest::new("NFTMarket", marketplace(), vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, VerifyError::Service(_)));
    }

    #[test]
    fn test_contract_url() {
        let server_url = "http://127.0.0.1:1";
        let endpoint = ExplorerEndpoint {
            api_url: server_url.to_string(),
            browser_url: "https://testnet.snowtrace.io".to_string(),
            api_key: String::new(),
        };
        let verifier = EtherscanVerifier::new(endpoint, "0.8.27", ArtifactStore::new("artifacts")).unwrap();
        assert_eq!(
            verifier.contract_url(marketplace()),
            "https://testnet.snowtrace.io/address/0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
    }
}
