//! SOAP Transport Client
//!
//! Talks to the authority's web service over HTTPS. Each ABRASF payload is
//! wrapped in a SOAP 1.1 envelope and posted inside the `nfsedadosmsg`
//! parameter of the operation; responses are parsed by the response module.
//!
//! Network-layer failures (connect, timeout) map to retryable errors;
//! HTTP and SOAP-level rejections are protocol failures and are not
//! retried by the orchestrator.

use crate::config::{EndpointConfig, ProviderConfig};
use crate::error::TransportError;
use crate::transport::{NfseTransport, response};
use crate::types::{BatchResults, SignedDocument, StatusReply, SubmissionHandle};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

const SOAP_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const ABRASF_NS: &str = "http://www.abrasf.org.br/nfse.xsd";

/// Production transport client
///
/// Holds one pooled HTTP client with a per-request timeout; connections
/// are managed by the pool, not by callers.
pub struct SoapTransport {
    client: reqwest::Client,
    endpoints: EndpointConfig,
    provider: ProviderConfig,
}

impl SoapTransport {
    /// Creates a transport for the configured endpoints
    pub fn new(
        endpoints: EndpointConfig,
        provider: ProviderConfig,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoints.timeout_secs))
            .build()
            .map_err(|e| TransportError::Connect {
                url: endpoints.submit_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        info!(
            environment = %endpoints.environment,
            "SOAP transport configured"
        );

        Ok(Self {
            client,
            endpoints,
            provider,
        })
    }

    /// POST one SOAP call and return the raw response body
    async fn call(
        &self,
        url: &str,
        operation: &str,
        payload: &str,
    ) -> Result<String, TransportError> {
        let envelope = soap_envelope(operation, payload);
        debug!(url, operation, bytes = envelope.len(), "sending SOAP request");

        let response = self
            .client
            .post(url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", operation)
            .body(envelope)
            .send()
            .await
            .map_err(|e| classify_request_error(url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error(url, e))?;

        if !status.is_success() {
            return Err(TransportError::Rejected {
                code: status.as_u16().to_string(),
                message: truncate(&body, 500),
            });
        }

        Ok(body)
    }

    /// ABRASF query body identifying the provider and the batch protocol
    fn query_payload(&self, root: &str, handle: &SubmissionHandle) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <{root} xmlns=\"{ABRASF_NS}\">\
             <Prestador>\
             <Cnpj>{cnpj}</Cnpj>\
             <InscricaoMunicipal>{im}</InscricaoMunicipal>\
             </Prestador>\
             <Protocolo>{protocolo}</Protocolo>\
             </{root}>",
            cnpj = self.provider.cnpj,
            im = self.provider.municipal_registration,
            protocolo = handle,
        )
    }
}

#[async_trait]
impl NfseTransport for SoapTransport {
    async fn submit(&self, doc: &SignedDocument) -> Result<SubmissionHandle, TransportError> {
        info!(mode = %doc.mode, "submitting batch to {}", self.endpoints.submit_url);
        let body = self
            .call(&self.endpoints.submit_url, "RecepcionarLoteRps", &doc.xml)
            .await?;
        let handle = response::parse_submit(&body)?;
        info!(%handle, "batch accepted by the service");
        Ok(handle)
    }

    async fn query_status(
        &self,
        handle: &SubmissionHandle,
    ) -> Result<StatusReply, TransportError> {
        let payload = self.query_payload("ConsultarSituacaoLoteRpsEnvio", handle);
        let body = self
            .call(
                &self.endpoints.status_url,
                "ConsultarSituacaoLoteRps",
                &payload,
            )
            .await?;
        let reply = response::parse_status(&body)?;
        debug!(%handle, status = ?reply.status, "status reply received");
        Ok(reply)
    }

    async fn fetch_results(
        &self,
        handle: &SubmissionHandle,
    ) -> Result<BatchResults, TransportError> {
        let payload = self.query_payload("ConsultarLoteRpsEnvio", handle);
        let body = self
            .call(&self.endpoints.results_url, "ConsultarLoteRps", &payload)
            .await?;
        response::parse_results(&body, handle)
    }
}

/// Wrap an ABRASF payload in the SOAP 1.1 envelope the servlets expect
fn soap_envelope(operation: &str, payload: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soapenv:Envelope xmlns:soapenv=\"{SOAP_NS}\" xmlns:nfse=\"{ABRASF_NS}\">\
         <soapenv:Body>\
         <nfse:{operation}>\
         <nfsedadosmsg><![CDATA[{payload}]]></nfsedadosmsg>\
         </nfse:{operation}>\
         </soapenv:Body>\
         </soapenv:Envelope>"
    )
}

/// Map reqwest failures onto the transport error taxonomy
fn classify_request_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Connect {
            url: url.to_string(),
            reason: error.to_string(),
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_embeds_payload_as_cdata() {
        let envelope = soap_envelope("RecepcionarLoteRps", "<EnviarLoteRpsEnvio/>");
        assert!(envelope.contains("<nfse:RecepcionarLoteRps>"));
        assert!(envelope.contains("<![CDATA[<EnviarLoteRpsEnvio/>]]>"));
        assert!(envelope.contains("</soapenv:Envelope>"));
    }

    #[test]
    fn query_payload_carries_provider_identity_and_protocol() {
        let transport = SoapTransport::new(
            EndpointConfig {
                environment: "homologation".to_string(),
                submit_url: "https://example.invalid/submit".to_string(),
                status_url: "https://example.invalid/status".to_string(),
                results_url: "https://example.invalid/results".to_string(),
                timeout_secs: 5,
            },
            ProviderConfig {
                cnpj: "32649500000145".to_string(),
                municipal_registration: "123".to_string(),
                municipality_code: "2700102".to_string(),
            },
        )
        .unwrap();

        let payload = transport.query_payload(
            "ConsultarSituacaoLoteRpsEnvio",
            &SubmissionHandle("P-77".to_string()),
        );
        assert!(payload.contains("<Cnpj>32649500000145</Cnpj>"));
        assert!(payload.contains("<InscricaoMunicipal>123</InscricaoMunicipal>"));
        assert!(payload.contains("<Protocolo>P-77</Protocolo>"));
        assert!(payload.ends_with("</ConsultarSituacaoLoteRpsEnvio>"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 500), "short");
        let truncated = truncate(&"é".repeat(300), 5);
        assert!(truncated.ends_with('…'));
    }
}
