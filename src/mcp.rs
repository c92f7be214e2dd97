//! MCP server implementation using rmcp.
//!
//! Exposes the judge as a single MCP tool.

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::transport::stdio;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::dispatch::Judge;
use crate::model::{Submission, SubmissionVerdict, TestCase, VerdictSummary};

/// MCP server wrapping a [`Judge`].
#[derive(Clone)]
pub struct JudgeServer {
    judge: Judge,
    tool_router: ToolRouter<Self>,
}

/// Parameters for the judge tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JudgeParams {
    #[schemars(description = "The candidate's source code")]
    pub source_code: String,

    #[schemars(description = "Language tag, e.g. 'javascript', 'js', 'python', 'py'")]
    pub language: String,

    #[schemars(description = "Test cases to run, in order")]
    pub test_cases: Vec<TestCaseParams>,

    /// Function to call when the source defines more than one.
    #[schemars(description = "Name of the function to call; required only when several are defined")]
    #[serde(default)]
    pub entry_point: Option<String>,

    #[schemars(description = "Points the question is worth; defaults to one per test case")]
    #[serde(default)]
    pub points: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseParams {
    pub id: String,

    #[schemars(description = "Comma-separated JSON arguments, e.g. '[1,2], 3'")]
    pub input: String,

    #[schemars(description = "Expected return value as JSON")]
    pub expected_output: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JudgeReport<'a> {
    #[serde(flatten)]
    verdict: &'a SubmissionVerdict,
    summary: VerdictSummary,
}

impl From<JudgeParams> for Submission {
    fn from(params: JudgeParams) -> Self {
        Self {
            source_code: params.source_code,
            language: params.language,
            test_cases: params
                .test_cases
                .into_iter()
                .map(|case| TestCase::new(case.id, case.input, case.expected_output))
                .collect(),
            entry_point: params.entry_point,
        }
    }
}

#[tool_router]
impl JudgeServer {
    pub fn new(judge: Judge) -> Self {
        Self {
            judge,
            tool_router: Self::tool_router(),
        }
    }

    /// Run a submission against its test cases.
    #[tool(description = "Run a coding-interview submission against its test cases and return the verdict")]
    async fn judge(
        &self,
        Parameters(params): Parameters<JudgeParams>,
    ) -> Result<CallToolResult, McpError> {
        let points = params.points;
        let submission = Submission::from(params);

        info!(
            language = %submission.language,
            tests = submission.test_cases.len(),
            code_len = submission.source_code.len(),
            "Judging submission"
        );

        let verdict = self.judge.judge(&submission).await;
        let report = JudgeReport {
            summary: verdict.summary(submission.test_cases.len(), points),
            verdict: &verdict,
        };

        let text = serde_json::to_string_pretty(&report).map_err(|e| {
            error!(error = %e, "Failed to encode verdict");
            McpError::internal_error(format!("Failed to encode verdict: {e}"), None)
        })?;

        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[tool_handler]
impl ServerHandler for JudgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "interview-judge".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Judge coding-interview submissions.\n\
                 Supported languages: javascript (js, node), python (python3, py).\n\
                 \n\
                 Use the 'judge' tool with:\n\
                 - sourceCode: the candidate's code, defining one top-level function\n\
                 - language: the language tag\n\
                 - testCases: [{ id, input, expectedOutput }]\n\
                 - entryPoint (optional): function to call when several are defined\n\
                 - points (optional): weight used for the score"
                    .into(),
            ),
        }
    }
}

/// Serve the judge over stdio.
pub async fn serve_stdio(judge: Judge) -> anyhow::Result<()> {
    let server = JudgeServer::new(judge);

    info!("Starting MCP server on stdio");

    let service = server
        .serve(stdio())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start MCP server: {e}"))?;

    service
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;

    Ok(())
}
