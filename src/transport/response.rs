//! Web service response extraction
//!
//! Parses the ABRASF response documents returned by the three operations.
//! Responses are searched under the ABRASF namespace first, then without a
//! namespace, since some municipal deployments omit the declaration.

use crate::error::TransportError;
use crate::types::{
    BatchResults, BatchStatus, IssuedInvoice, RecordRejection, StatusReply, SubmissionHandle,
};
use sxd_document::parser;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value, XPath};

const ABRASF_NS: &str = "http://www.abrasf.org.br/nfse.xsd";

/// Extract the protocol handle from a submission response
pub(super) fn parse_submit(body: &str) -> Result<SubmissionHandle, TransportError> {
    let package = parse(body)?;
    let doc = package.as_document();

    if let Some(protocol) = text_of(doc.root(), &["//nfse:Protocolo", "//Protocolo"])? {
        return Ok(SubmissionHandle(protocol));
    }

    // No protocol: the service reports the rejection through MensagemRetorno
    let rejections = rejections_of(doc.root())?;
    match rejections.into_iter().next() {
        Some(rejection) => Err(TransportError::Rejected {
            code: rejection.code,
            message: rejection.message,
        }),
        None => Err(TransportError::InvalidResponse(
            "submission response carries neither a protocol nor an error message".to_string(),
        )),
    }
}

/// Extract the batch status from a status query response
pub(super) fn parse_status(body: &str) -> Result<StatusReply, TransportError> {
    let package = parse(body)?;
    let doc = package.as_document();

    if let Some(text) = text_of(doc.root(), &["//nfse:Situacao", "//Situacao"])? {
        let code: u32 = text.parse().map_err(|_| {
            TransportError::InvalidResponse(format!("non-numeric status code `{text}`"))
        })?;
        let status = BatchStatus::from_code(code).ok_or_else(|| {
            TransportError::InvalidResponse(format!("unknown status code {code}"))
        })?;
        return Ok(StatusReply::new(status));
    }

    let rejections = rejections_of(doc.root())?;
    match rejections.into_iter().next() {
        Some(rejection) => Err(TransportError::Rejected {
            code: rejection.code,
            message: rejection.message,
        }),
        None => Err(TransportError::InvalidResponse(
            "status response carries no Situacao element".to_string(),
        )),
    }
}

/// Extract issued invoices or rejection reasons from a result-fetch response
pub(super) fn parse_results(
    body: &str,
    handle: &SubmissionHandle,
) -> Result<BatchResults, TransportError> {
    let package = parse(body)?;
    let doc = package.as_document();

    let invoices = nodes_of(doc.root(), &["//nfse:CompNfse", "//CompNfse"])?;
    if !invoices.is_empty() {
        let mut issued = Vec::with_capacity(invoices.len());
        for (record_index, node) in invoices.into_iter().enumerate() {
            let invoice_number = text_of(node, &[".//nfse:Numero", ".//Numero"])?.ok_or_else(
                || {
                    TransportError::InvalidResponse(format!(
                        "invoice entry {record_index} carries no number"
                    ))
                },
            )?;
            issued.push(IssuedInvoice {
                record_index,
                invoice_number,
                verification_code: text_of(
                    node,
                    &[".//nfse:CodigoVerificacao", ".//CodigoVerificacao"],
                )?,
                issued_at: text_of(node, &[".//nfse:DataEmissao", ".//DataEmissao"])?,
            });
        }
        return Ok(BatchResults::Issued(issued));
    }

    let rejections = rejections_of(doc.root())?;
    if !rejections.is_empty() {
        return Ok(BatchResults::Rejected(rejections));
    }

    Err(TransportError::ResultsNotReady(handle.clone()))
}

fn parse(body: &str) -> Result<sxd_document::Package, TransportError> {
    parser::parse(body)
        .map_err(|e| TransportError::InvalidResponse(format!("malformed response XML: {e}")))
}

/// Collect `MensagemRetorno` entries as record rejections, in document order
fn rejections_of(root: sxd_document::dom::Root<'_>) -> Result<Vec<RecordRejection>, TransportError> {
    let nodes = nodes_of(root, &["//nfse:MensagemRetorno", "//MensagemRetorno"])?;
    let mut rejections = Vec::with_capacity(nodes.len());
    for node in nodes {
        let code = text_of(node, &[".//nfse:Codigo", ".//Codigo"])?
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let message = text_of(node, &[".//nfse:Mensagem", ".//Mensagem"])?
            .unwrap_or_else(|| "no message supplied".to_string());
        rejections.push(RecordRejection {
            record_index: None,
            code,
            message,
        });
    }
    Ok(rejections)
}

/// String value of the first node matched by any of the expressions
fn text_of<'d, N>(node: N, expressions: &[&str]) -> Result<Option<String>, TransportError>
where
    N: Into<Node<'d>> + Copy,
{
    for expression in expressions {
        let value = evaluate(node, expression)?;
        let text = value.string();
        let text = text.trim();
        if !text.is_empty() {
            return Ok(Some(text.to_string()));
        }
    }
    Ok(None)
}

/// Nodes matched by the first expression with a non-empty result, in document order
fn nodes_of<'d, N>(node: N, expressions: &[&str]) -> Result<Vec<Node<'d>>, TransportError>
where
    N: Into<Node<'d>> + Copy,
{
    for expression in expressions {
        if let Value::Nodeset(nodes) = evaluate(node, expression)? {
            if nodes.size() > 0 {
                return Ok(nodes.document_order());
            }
        }
    }
    Ok(Vec::new())
}

fn evaluate<'d, N>(node: N, expression: &str) -> Result<Value<'d>, TransportError>
where
    N: Into<Node<'d>>,
{
    let mut context = Context::new();
    context.set_namespace("nfse", ABRASF_NS);
    compile(expression)?
        .evaluate(&context, node)
        .map_err(|e| TransportError::InvalidResponse(format!("xpath evaluation failed: {e}")))
}

fn compile(expression: &str) -> Result<XPath, TransportError> {
    Factory::new()
        .build(expression)
        .map_err(|e| TransportError::InvalidResponse(format!("bad xpath `{expression}`: {e}")))?
        .ok_or_else(|| {
            TransportError::InvalidResponse(format!("empty xpath expression `{expression}`"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_response_yields_protocol() {
        let body = "<EnviarLoteRpsResposta xmlns=\"http://www.abrasf.org.br/nfse.xsd\">\
                    <Protocolo>P-2024-001</Protocolo>\
                    </EnviarLoteRpsResposta>";
        let handle = parse_submit(body).unwrap();
        assert_eq!(handle, SubmissionHandle("P-2024-001".to_string()));
    }

    #[test]
    fn submit_response_without_namespace_still_parses() {
        let body = "<EnviarLoteRpsResposta><Protocolo>P-9</Protocolo></EnviarLoteRpsResposta>";
        assert_eq!(
            parse_submit(body).unwrap(),
            SubmissionHandle("P-9".to_string())
        );
    }

    #[test]
    fn submit_rejection_surfaces_code_and_message() {
        let body = "<EnviarLoteRpsResposta xmlns=\"http://www.abrasf.org.br/nfse.xsd\">\
                    <ListaMensagemRetorno><MensagemRetorno>\
                    <Codigo>E160</Codigo><Mensagem>Invalid schema</Mensagem>\
                    </MensagemRetorno></ListaMensagemRetorno>\
                    </EnviarLoteRpsResposta>";
        let err = parse_submit(body).unwrap_err();
        assert_eq!(
            err,
            TransportError::Rejected {
                code: "E160".to_string(),
                message: "Invalid schema".to_string(),
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn status_codes_map_to_batch_statuses() {
        for (code, status) in [
            (1, BatchStatus::Unreceived),
            (2, BatchStatus::Processing),
            (3, BatchStatus::Error),
            (4, BatchStatus::Processed),
        ] {
            let body = format!(
                "<ConsultarSituacaoLoteRpsResposta xmlns=\"http://www.abrasf.org.br/nfse.xsd\">\
                 <Situacao>{code}</Situacao>\
                 </ConsultarSituacaoLoteRpsResposta>"
            );
            assert_eq!(parse_status(&body).unwrap().status, status);
        }
    }

    #[test]
    fn unknown_status_code_is_invalid_response() {
        let body = "<ConsultarSituacaoLoteRpsResposta><Situacao>9</Situacao>\
                    </ConsultarSituacaoLoteRpsResposta>";
        assert!(matches!(
            parse_status(body).unwrap_err(),
            TransportError::InvalidResponse(_)
        ));
    }

    #[test]
    fn results_list_preserves_document_order() {
        let body = "<ConsultarLoteRpsResposta xmlns=\"http://www.abrasf.org.br/nfse.xsd\">\
                    <ListaNfse>\
                    <CompNfse><Nfse><InfNfse><Numero>000000001</Numero>\
                    <CodigoVerificacao>AAA1</CodigoVerificacao></InfNfse></Nfse></CompNfse>\
                    <CompNfse><Nfse><InfNfse><Numero>000000002</Numero>\
                    <CodigoVerificacao>BBB2</CodigoVerificacao></InfNfse></Nfse></CompNfse>\
                    </ListaNfse>\
                    </ConsultarLoteRpsResposta>";
        let results = parse_results(body, &SubmissionHandle("P-1".to_string())).unwrap();

        let BatchResults::Issued(invoices) = results else {
            panic!("expected issued invoices");
        };
        assert_eq!(invoices.len(), 2);
        assert_eq!(invoices[0].record_index, 0);
        assert_eq!(invoices[0].invoice_number, "000000001");
        assert_eq!(invoices[0].verification_code.as_deref(), Some("AAA1"));
        assert_eq!(invoices[1].record_index, 1);
        assert_eq!(invoices[1].invoice_number, "000000002");
    }

    #[test]
    fn rejection_list_is_returned_for_failed_batches() {
        let body = "<ConsultarLoteRpsResposta xmlns=\"http://www.abrasf.org.br/nfse.xsd\">\
                    <ListaMensagemRetorno>\
                    <MensagemRetorno><Codigo>E92</Codigo><Mensagem>Bad rate</Mensagem></MensagemRetorno>\
                    <MensagemRetorno><Codigo>E10</Codigo><Mensagem>Bad code</Mensagem></MensagemRetorno>\
                    </ListaMensagemRetorno>\
                    </ConsultarLoteRpsResposta>";
        let results = parse_results(body, &SubmissionHandle("P-1".to_string())).unwrap();

        let BatchResults::Rejected(rejections) = results else {
            panic!("expected rejections");
        };
        assert_eq!(rejections.len(), 2);
        assert_eq!(rejections[0].code, "E92");
        assert_eq!(rejections[1].message, "Bad code");
    }

    #[test]
    fn empty_result_body_means_not_ready() {
        let body = "<ConsultarLoteRpsResposta xmlns=\"http://www.abrasf.org.br/nfse.xsd\">\
                    </ConsultarLoteRpsResposta>";
        let err = parse_results(body, &SubmissionHandle("P-5".to_string())).unwrap_err();
        assert_eq!(
            err,
            TransportError::ResultsNotReady(SubmissionHandle("P-5".to_string()))
        );
    }
}
