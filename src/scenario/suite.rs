//! DNS scenario suites
//!
//! A suite is a list of cases loaded from YAML, each naming a template and
//! the request/response parameters to run it with.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::dns::{RequestValidationParams, ResponseValidationParams, ScenarioBuilder, EMPTY_RESPONSE};
use super::Scenario;
use crate::common::{Error, Result};

/// Which scenario template a case runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    Basic,
    Advanced,
}

/// One named case of a suite
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SuiteCase {
    pub name: String,
    pub template: Template,
    pub request: RequestValidationParams,
    pub response: ResponseValidationParams,
}

/// A set of DNS cases loaded from a YAML file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Suite {
    /// Optional suite name
    #[serde(default)]
    pub name: Option<String>,
    pub cases: Vec<SuiteCase>,
}

impl Suite {
    /// Load a suite from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let suite: Suite = serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse suite: {}", e)))?;
        if suite.cases.is_empty() {
            return Err(Error::Config("Suite has no cases".to_string()));
        }
        for case in &suite.cases {
            case.validate()?;
        }
        Ok(suite)
    }

    /// The stock cases: a resolvable name and a nonexistent one, for both templates
    pub fn builtin() -> Self {
        let mut cases = Vec::new();
        for template in [Template::Basic, Template::Advanced] {
            let prefix = match template {
                Template::Basic => "basic",
                Template::Advanced => "advanced",
            };
            cases.push(SuiteCase {
                name: format!("{} dns: valid domain", prefix),
                template,
                request: valid_request(),
                response: valid_response(),
            });
            cases.push(SuiteCase {
                name: format!("{} dns: nonexistent domain", prefix),
                template,
                request: nxdomain_request(),
                response: nxdomain_response(),
            });
        }
        Self {
            name: Some("dns".to_string()),
            cases,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("dns")
    }

    /// Build every case into a scenario
    ///
    /// Advanced cases need the kubeconfig used for owner lookups.
    pub fn scenarios(
        &self,
        builder: &ScenarioBuilder,
        kubeconfig: Option<&Path>,
    ) -> Result<Vec<Scenario>> {
        self.cases
            .iter()
            .map(|case| case.scenario(builder, kubeconfig))
            .collect()
    }
}

impl SuiteCase {
    pub fn validate(&self) -> Result<()> {
        self.request
            .validate()
            .and_then(|_| self.response.validate())
            .map_err(|e| match e {
                Error::Config(msg) => Error::Config(format!("Case '{}': {}", self.name, msg)),
                other => other,
            })
    }

    pub fn scenario(&self, builder: &ScenarioBuilder, kubeconfig: Option<&Path>) -> Result<Scenario> {
        match self.template {
            Template::Basic => Ok(builder.basic(&self.name, &self.request, &self.response)),
            Template::Advanced => {
                let kubeconfig = kubeconfig.ok_or_else(|| {
                    Error::Config(format!(
                        "Case '{}' uses the advanced template and needs a kubeconfig",
                        self.name
                    ))
                })?;
                Ok(builder.advanced(&self.name, &self.request, &self.response, kubeconfig))
            }
        }
    }
}

const VALID_QUERY: &str = "kubernetes.default.svc.cluster.local.";
const NXDOMAIN_QUERY: &str = "some.non.existent.domain.";

fn valid_request() -> RequestValidationParams {
    RequestValidationParams {
        num_response: "0".to_string(),
        query: VALID_QUERY.to_string(),
        query_type: "A".to_string(),
        command: "nslookup kubernetes.default".to_string(),
        expect_error: false,
        expected_count: None,
    }
}

fn valid_response() -> ResponseValidationParams {
    ResponseValidationParams {
        num_response: "1".to_string(),
        query: VALID_QUERY.to_string(),
        query_type: "A".to_string(),
        return_code: "NOERROR".to_string(),
        response: "10.0.0.1".to_string(),
        expected_count: None,
    }
}

fn nxdomain_request() -> RequestValidationParams {
    RequestValidationParams {
        num_response: "0".to_string(),
        query: NXDOMAIN_QUERY.to_string(),
        query_type: "A".to_string(),
        command: format!("nslookup {}", NXDOMAIN_QUERY),
        expect_error: true,
        expected_count: None,
    }
}

fn nxdomain_response() -> ResponseValidationParams {
    ResponseValidationParams {
        num_response: "0".to_string(),
        query: NXDOMAIN_QUERY.to_string(),
        query_type: "A".to_string(),
        return_code: "NXDOMAIN".to_string(),
        response: EMPTY_RESPONSE.to_string(),
        expected_count: None,
    }
}
