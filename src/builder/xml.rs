//! ABRASF batch XML rendering
//!
//! Builds the `EnviarLoteRpsEnvio` tree with sxd-document and serializes it
//! in one pass. Every element carries at most one attribute, so the
//! serialized form is byte-stable and doubles as the canonical form the
//! signer digests. The writer emits attributes with single quotes.

use crate::types::{BatchHeader, InvoiceRecord, ServiceTaker};
use sxd_document::Package;
use sxd_document::dom::{Document, Element};
use sxd_document::writer::format_document;

/// ABRASF national NFSe schema namespace
pub const ABRASF_NS: &str = "http://www.abrasf.org.br/nfse.xsd";

/// Date format mandated by the schema for `DataEmissao`
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Render the full batch envelope for the given records
///
/// Records must already be validated; this function only projects them.
pub(super) fn render(records: &[InvoiceRecord], header: &BatchHeader, lote_id: &str) -> String {
    let package = Package::new();
    let doc = package.as_document();

    let envio = doc.create_element("EnviarLoteRpsEnvio");
    envio.set_attribute_value("xmlns", ABRASF_NS);
    doc.root().append_child(envio);

    let lote = child(&doc, envio, "LoteRps");
    lote.set_attribute_value("Id", lote_id);

    text(&doc, lote, "NumeroLote", &header.batch_number.to_string());
    let cpf_cnpj = child(&doc, lote, "CpfCnpj");
    text(&doc, cpf_cnpj, "Cnpj", &header.provider_cnpj);
    text(&doc, lote, "InscricaoMunicipal", &header.municipal_registration);
    text(&doc, lote, "QuantidadeRps", &records.len().to_string());

    let lista = child(&doc, lote, "ListaRps");
    for record in records {
        render_rps(&doc, lista, record);
    }

    let mut out = Vec::new();
    format_document(&doc, &mut out).expect("writing to an in-memory buffer cannot fail");
    String::from_utf8(out).expect("serializer emits UTF-8")
}

/// Render one `Rps` projection under `ListaRps`
fn render_rps(doc: &Document<'_>, lista: Element<'_>, record: &InvoiceRecord) {
    let rps = child(doc, lista, "Rps");
    let inf = child(doc, rps, "InfRps");
    inf.set_attribute_value("Id", &format!("rps_{}", record.rps_number));

    let ident = child(doc, inf, "IdentificacaoRps");
    text(doc, ident, "Numero", &record.rps_number.to_string());
    text(doc, ident, "Serie", &record.rps_series);
    text(doc, ident, "Tipo", &record.rps_type.to_string());

    text(
        doc,
        inf,
        "DataEmissao",
        &record.issue_date.format(DATE_FORMAT).to_string(),
    );
    // Status 1 = RPS is being converted normally (2 would mean cancellation)
    text(doc, inf, "StatusRps", "1");

    let servico = child(doc, inf, "Servico");
    let valores = child(doc, servico, "Valores");
    text(doc, valores, "ValorServicos", &format!("{:.2}", record.service_amount));
    text(doc, valores, "ValorIss", &format!("{:.2}", record.iss_amount));
    text(doc, valores, "Aliquota", &format!("{:.4}", record.iss_rate));
    // 2 = ISS not withheld by the service taker
    text(doc, servico, "IssRetido", "2");
    text(doc, servico, "ItemListaServico", &record.service_code);
    text(doc, servico, "Discriminacao", &record.description);
    text(doc, servico, "CodigoMunicipio", &record.municipality_code);

    let prestador = child(doc, inf, "Prestador");
    let prestador_cnpj = child(doc, prestador, "CpfCnpj");
    text(doc, prestador_cnpj, "Cnpj", &record.provider_cnpj);
    text(doc, prestador, "InscricaoMunicipal", &record.municipal_registration);

    render_taker(doc, inf, &record.taker);
}

/// Render the `Tomador` block under `InfRps`
fn render_taker(doc: &Document<'_>, inf: Element<'_>, taker: &ServiceTaker) {
    let tomador = child(doc, inf, "Tomador");

    let ident = child(doc, tomador, "IdentificacaoTomador");
    let cpf_cnpj = child(doc, ident, "CpfCnpj");
    // 11 digits is a natural person (CPF); companies carry a 14-digit CNPJ
    let document_tag = if taker.document.len() == 11 { "Cpf" } else { "Cnpj" };
    text(doc, cpf_cnpj, document_tag, &taker.document);

    text(doc, tomador, "RazaoSocial", &taker.legal_name);

    let endereco = child(doc, tomador, "Endereco");
    text(doc, endereco, "Endereco", &taker.street);
    text(doc, endereco, "Numero", &taker.street_number);
    text(doc, endereco, "Bairro", &taker.district);
    text(doc, endereco, "CodigoMunicipio", &taker.municipality_code);
    text(doc, endereco, "Uf", &taker.state);
    text(doc, endereco, "Cep", &taker.postal_code);
}

fn child<'d>(doc: &Document<'d>, parent: Element<'d>, name: &str) -> Element<'d> {
    let element = doc.create_element(name);
    parent.append_child(element);
    element
}

fn text<'d>(doc: &Document<'d>, parent: Element<'d>, name: &str, value: &str) {
    let element = child(doc, parent, name);
    element.append_child(doc.create_text(value));
}
