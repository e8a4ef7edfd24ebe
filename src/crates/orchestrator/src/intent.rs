//! Semantic intent classification
//!
//! The intent node delegates to a pluggable [`SemanticIntentService`]. The
//! shipped implementation is a deterministic keyword classifier over the
//! Spanish/English vocabulary of the assistant; an LLM-backed service can
//! replace it behind the same trait. Classification failures fail open to
//! `Unknown` with confidence 0 - a turn is never aborted by the classifier.

use agentgraph_core::Intent;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Outcome of classifying one query
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticResult {
    pub intent: Intent,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Specialist suggested by the classifier, if any
    pub target_agent: Option<String>,
}

impl SemanticResult {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            target_agent: None,
        }
    }
}

/// Pluggable intent classifier
///
/// Implementations performing external I/O (LLM calls) must bound their own
/// retries and timeouts; errors degrade to [`SemanticResult::unknown`] at
/// the call site.
#[async_trait]
pub trait SemanticIntentService: Send + Sync {
    async fn classify(
        &self,
        query: &str,
        payload: &Map<String, Value>,
    ) -> Result<SemanticResult, String>;
}

/// Deterministic keyword classifier (default)
#[derive(Debug, Clone, Default)]
pub struct HeuristicIntentService;

impl HeuristicIntentService {
    pub fn new() -> Self {
        Self
    }

    fn result(intent: Intent, confidence: f64, target_agent: Option<&str>) -> SemanticResult {
        SemanticResult {
            intent,
            confidence,
            target_agent: target_agent.map(str::to_string),
        }
    }
}

#[async_trait]
impl SemanticIntentService for HeuristicIntentService {
    async fn classify(
        &self,
        query: &str,
        payload: &Map<String, Value>,
    ) -> Result<SemanticResult, String> {
        // Structured payloads with a database operation win over text
        if payload.get("operation").and_then(Value::as_str).is_some() {
            return Ok(Self::result(Intent::DbOperation, 0.95, Some("capi_datab")));
        }

        // Callers may name the specialist directly in the payload
        if let Some(target) = payload.get("target_agent").and_then(Value::as_str) {
            return Ok(Self::result(Intent::Query, 0.9, Some(target)));
        }

        let q = query.to_lowercase();
        if q.trim().is_empty() {
            return Ok(SemanticResult::unknown());
        }

        let matches = |keywords: &[&str]| keywords.iter().any(|k| q.contains(k));

        let result = if matches(&["hola", "buenos dias", "buenas tardes", "hello", "hi "]) {
            Self::result(Intent::Greeting, 0.95, Some("capi_gus"))
        } else if matches(&["gracias", "como estas", "que tal", "chau", "adios"]) {
            Self::result(Intent::SmallTalk, 0.8, Some("capi_gus"))
        } else if matches(&["gmail", "correo", "mail"]) {
            Self::result(Intent::GoogleGmail, 0.85, Some("agente_g"))
        } else if matches(&["drive", "documento compartido"]) {
            Self::result(Intent::GoogleDrive, 0.85, Some("agente_g"))
        } else if matches(&["calendario", "calendar", "reunion", "evento"]) {
            Self::result(Intent::GoogleCalendar, 0.85, Some("agente_g"))
        } else if matches(&["workspace", "google"]) {
            Self::result(Intent::GoogleWorkspace, 0.7, Some("agente_g"))
        } else if matches(&["anomal", "irregular", "sospechos"]) {
            Self::result(Intent::AnomalyQuery, 0.85, Some("anomaly"))
        } else if matches(&["saldo", "sucursal", "caja"]) {
            Self::result(Intent::BranchQuery, 0.9, Some("capi_datab"))
        } else if matches(&["archivo", "abri", "abre", "escritorio", "desktop", ".xlsx", ".csv", ".pdf"]) {
            Self::result(Intent::FileOperation, 0.85, Some("capi_desktop"))
        } else if matches(&["select ", "update ", "insert ", "delete ", "tabla", "consulta sql"]) {
            Self::result(Intent::DbOperation, 0.85, Some("capi_datab"))
        } else if matches(&["noticia", "news"]) {
            Self::result(Intent::Query, 0.7, Some("capi_noticias"))
        } else if matches(&["resumen", "resumir", "resume", "summary"]) {
            Self::result(Intent::SummaryRequest, 0.85, Some("capi_gus"))
        } else {
            Self::result(Intent::Query, 0.5, None)
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn classify(query: &str) -> SemanticResult {
        HeuristicIntentService::new()
            .classify(query, &Map::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_greeting() {
        let result = classify("hola").await;
        assert_eq!(result.intent, Intent::Greeting);
        assert_eq!(result.target_agent.as_deref(), Some("capi_gus"));
    }

    #[tokio::test]
    async fn test_branch_query() {
        let result = classify("dame el saldo de la sucursal 23").await;
        assert_eq!(result.intent, Intent::BranchQuery);
        assert_eq!(result.target_agent.as_deref(), Some("capi_datab"));
    }

    #[tokio::test]
    async fn test_file_operation() {
        let result = classify("abr\u{ed} el archivo reporte.xlsx").await;
        assert_eq!(result.intent, Intent::FileOperation);
        assert_eq!(result.target_agent.as_deref(), Some("capi_desktop"));
    }

    #[tokio::test]
    async fn test_payload_operation_wins() {
        let mut payload = Map::new();
        payload.insert("operation".into(), Value::String("update".into()));
        let result = HeuristicIntentService::new()
            .classify("whatever", &payload)
            .await
            .unwrap();
        assert_eq!(result.intent, Intent::DbOperation);
    }

    #[tokio::test]
    async fn test_empty_query_is_unknown() {
        let result = classify("   ").await;
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_anomaly_keywords() {
        let result = classify("hay movimientos anomalos?").await;
        assert_eq!(result.intent, Intent::AnomalyQuery);
    }
}
