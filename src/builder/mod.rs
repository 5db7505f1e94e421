//! Document Builder Module
//!
//! Turns a list of pending invoice records into a well-formed ABRASF
//! `EnviarLoteRpsEnvio` batch document. The builder is a pure function:
//! no network or filesystem access, deterministic given the same inputs,
//! so identical record sets always render to byte-identical XML.
//!
//! # Validation
//! Every record must carry all schema-mandatory fields. Validation fails
//! fast with the offending record index and field name on the first
//! violation; partial batches are never produced.
//!
//! # Ordering
//! Records keep their input order inside `ListaRps`. This order is
//! load-bearing: invoice numbers returned after processing are correlated
//! back to records by position.

mod xml;

use crate::error::ValidationError;
use crate::types::{BatchDocument, BatchHeader, InvoiceRecord};
use tracing::debug;

/// Build a batch document from pending records
///
/// # Arguments
/// * `records` - Pending invoice records, in submission order
/// * `header` - Provider identity and batch sequence number
///
/// # Returns
/// * `Ok(BatchDocument)` with exactly one `Rps` projection per record
/// * `Err(ValidationError)` naming the first invalid record and field
pub fn build(
    records: &[InvoiceRecord],
    header: &BatchHeader,
) -> Result<BatchDocument, ValidationError> {
    validate(records)?;

    let lote_id = format!("lote_{}", header.batch_number);
    let rendered = xml::render(records, header, &lote_id);
    debug!(
        batch_number = header.batch_number,
        records = records.len(),
        bytes = rendered.len(),
        "batch document rendered"
    );

    Ok(BatchDocument {
        batch_number: header.batch_number,
        record_count: records.len(),
        lote_id,
        xml: rendered,
    })
}

/// Check schema-mandatory fields on every record, failing on the first violation
fn validate(records: &[InvoiceRecord]) -> Result<(), ValidationError> {
    for (index, record) in records.iter().enumerate() {
        require_digits(index, "provider_cnpj", &record.provider_cnpj)?;
        if !cnpj_is_valid(&record.provider_cnpj) {
            return Err(ValidationError::InvalidTaxId {
                index,
                field: "provider_cnpj",
                value: record.provider_cnpj.clone(),
            });
        }
        require_present(index, "municipal_registration", &record.municipal_registration)?;
        if record.rps_number == 0 {
            return Err(ValidationError::InvalidSequenceNumber { index });
        }
        require_present(index, "rps_series", &record.rps_series)?;
        require_present(index, "description", &record.description)?;
        require_present(index, "service_code", &record.service_code)?;
        require_digits(index, "municipality_code", &record.municipality_code)?;
        require_amount(index, "service_amount", record.service_amount)?;
        require_amount(index, "iss_amount", record.iss_amount)?;
        require_amount(index, "iss_rate", record.iss_rate)?;
        require_present(index, "taker_legal_name", &record.taker.legal_name)?;
        require_digits(index, "taker_document", &record.taker.document)?;
        let taker_document_ok = match record.taker.document.len() {
            14 => cnpj_is_valid(&record.taker.document),
            11 => cpf_is_valid(&record.taker.document),
            _ => false,
        };
        if !taker_document_ok {
            return Err(ValidationError::InvalidTaxId {
                index,
                field: "taker_document",
                value: record.taker.document.clone(),
            });
        }
    }
    Ok(())
}

fn require_present(
    index: usize,
    field: &'static str,
    value: &str,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField { index, field });
    }
    Ok(())
}

fn require_digits(index: usize, field: &'static str, value: &str) -> Result<(), ValidationError> {
    require_present(index, field, value)?;
    if !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::MalformedField {
            index,
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn require_amount(index: usize, field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::InvalidAmount {
            index,
            field,
            value,
        });
    }
    Ok(())
}

/// Verify the two CNPJ check digits (digits 13 and 14)
fn cnpj_is_valid(value: &str) -> bool {
    let digits: Vec<u32> = value.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 14 || digits.iter().all(|&d| d == digits[0]) {
        return false;
    }
    digits[12] == cnpj_check_digit(&digits[..12]) && digits[13] == cnpj_check_digit(&digits[..13])
}

/// CNPJ weights start at 5 (first digit) or 6 (second) and cycle back to 9
/// after reaching 2
fn cnpj_check_digit(digits: &[u32]) -> u32 {
    let mut weight = if digits.len() == 12 { 5 } else { 6 };
    let mut sum = 0;
    for &digit in digits {
        sum += digit * weight;
        weight -= 1;
        if weight < 2 {
            weight = 9;
        }
    }
    let rest = sum % 11;
    if rest < 2 { 0 } else { 11 - rest }
}

/// Verify the two CPF check digits (digits 10 and 11)
fn cpf_is_valid(value: &str) -> bool {
    let digits: Vec<u32> = value.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 || digits.iter().all(|&d| d == digits[0]) {
        return false;
    }
    digits[9] == cpf_check_digit(&digits[..9]) && digits[10] == cpf_check_digit(&digits[..10])
}

/// CPF weights descend from 10 (first digit) or 11 (second) down to 2
fn cpf_check_digit(digits: &[u32]) -> u32 {
    let top = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &digit)| digit * (top - i as u32))
        .sum();
    let rest = sum % 11;
    if rest < 2 { 0 } else { 11 - rest }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServiceTaker;
    use chrono::NaiveDate;

    fn taker() -> ServiceTaker {
        ServiceTaker {
            document: "12345678000195".to_string(),
            legal_name: "Empresa Tomadora de Servicos Ltda".to_string(),
            street: "Rua das Flores, 123".to_string(),
            street_number: "123".to_string(),
            district: "Centro".to_string(),
            municipality_code: "2700102".to_string(),
            state: "AL".to_string(),
            postal_code: "57300000".to_string(),
        }
    }

    fn record(number: u64) -> InvoiceRecord {
        InvoiceRecord {
            provider_cnpj: "32649500000145".to_string(),
            municipal_registration: "123".to_string(),
            rps_number: number,
            rps_series: "1".to_string(),
            rps_type: 1,
            issue_date: NaiveDate::from_ymd_opt(2025, 9, 30)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            description: "IT consulting services".to_string(),
            service_amount: 1000.0,
            iss_amount: 50.0,
            iss_rate: 0.05,
            service_code: "01.01".to_string(),
            municipality_code: "2700102".to_string(),
            taker: taker(),
        }
    }

    fn header() -> BatchHeader {
        BatchHeader {
            provider_cnpj: "32649500000145".to_string(),
            municipal_registration: "123".to_string(),
            municipality_code: "2700102".to_string(),
            batch_number: 42,
        }
    }

    #[test]
    fn one_projection_per_record_in_input_order() {
        let records = vec![record(7), record(3), record(9)];
        let doc = build(&records, &header()).unwrap();

        assert_eq!(doc.record_count, 3);
        assert_eq!(doc.xml.matches("<Rps>").count(), 3);
        assert_eq!(doc.xml.matches("<QuantidadeRps>3</QuantidadeRps>").count(), 1);

        // Input order is preserved in the rendered list
        let first = doc.xml.find("rps_7").unwrap();
        let second = doc.xml.find("rps_3").unwrap();
        let third = doc.xml.find("rps_9").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn build_is_deterministic() {
        let records = vec![record(1), record(2)];
        let a = build(&records, &header()).unwrap();
        let b = build(&records, &header()).unwrap();
        assert_eq!(a.xml, b.xml);
    }

    #[test]
    fn lote_id_references_batch_number() {
        let doc = build(&[record(1)], &header()).unwrap();
        assert_eq!(doc.lote_id, "lote_42");
        assert!(doc.xml.contains("Id='lote_42'"));
        assert!(doc.xml.contains("<NumeroLote>42</NumeroLote>"));
    }

    #[test]
    fn rendered_attributes_use_single_quotes() {
        let doc = build(&[record(1)], &header()).unwrap();
        assert!(doc.xml.contains("<LoteRps Id='lote_42'>"));
        assert!(doc.xml.contains("<InfRps Id='rps_1'>"));
        assert!(!doc.xml.contains('"'));
    }

    #[test]
    fn taker_block_is_rendered_under_inf_rps() {
        let doc = build(&[record(1)], &header()).unwrap();
        assert!(doc.xml.contains(
            "<Tomador><IdentificacaoTomador><CpfCnpj><Cnpj>12345678000195</Cnpj></CpfCnpj>\
             </IdentificacaoTomador><RazaoSocial>Empresa Tomadora de Servicos Ltda</RazaoSocial>"
        ));
        assert!(doc.xml.contains("<Endereco><Endereco>Rua das Flores, 123</Endereco>"));
        assert!(doc.xml.contains("<Uf>AL</Uf><Cep>57300000</Cep>"));
    }

    #[test]
    fn natural_person_taker_uses_cpf_element() {
        let mut records = vec![record(1)];
        records[0].taker.document = "11144477735".to_string();

        let doc = build(&records, &header()).unwrap();
        assert!(doc.xml.contains("<CpfCnpj><Cpf>11144477735</Cpf></CpfCnpj>"));
    }

    #[test]
    fn amounts_use_fixed_decimal_places() {
        let doc = build(&[record(1)], &header()).unwrap();
        assert!(doc.xml.contains("<ValorServicos>1000.00</ValorServicos>"));
        assert!(doc.xml.contains("<ValorIss>50.00</ValorIss>"));
        assert!(doc.xml.contains("<Aliquota>0.0500</Aliquota>"));
    }

    #[test]
    fn missing_provider_cnpj_names_record_index() {
        let mut records = vec![record(1), record(2), record(3)];
        records[1].provider_cnpj.clear();

        let err = build(&records, &header()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                index: 1,
                field: "provider_cnpj"
            }
        );
    }

    #[test]
    fn non_numeric_cnpj_is_rejected() {
        let mut records = vec![record(1)];
        records[0].provider_cnpj = "32.649.500/0001-45".to_string();

        let err = build(&records, &header()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MalformedField {
                index: 0,
                field: "provider_cnpj",
                ..
            }
        ));
    }

    #[test]
    fn negative_amount_is_rejected() {
        let mut records = vec![record(1)];
        records[0].service_amount = -10.0;

        let err = build(&records, &header()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidAmount {
                index: 0,
                field: "service_amount",
                ..
            }
        ));
    }

    #[test]
    fn zero_rps_number_is_rejected() {
        let err = build(&[record(0)], &header()).unwrap_err();
        assert_eq!(err, ValidationError::InvalidSequenceNumber { index: 0 });
    }

    #[test]
    fn missing_taker_name_is_rejected() {
        let mut records = vec![record(1)];
        records[0].taker.legal_name.clear();

        let err = build(&records, &header()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                index: 0,
                field: "taker_legal_name"
            }
        );
    }

    #[test]
    fn provider_cnpj_check_digits_are_verified() {
        let mut records = vec![record(1)];
        // Last check digit off by one
        records[0].provider_cnpj = "32649500000144".to_string();

        let err = build(&records, &header()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidTaxId {
                index: 0,
                field: "provider_cnpj",
                ..
            }
        ));
    }

    #[test]
    fn taker_document_check_digits_are_verified() {
        let mut records = vec![record(1)];
        records[0].taker.document = "12345678000190".to_string();

        let err = build(&records, &header()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidTaxId {
                index: 0,
                field: "taker_document",
                ..
            }
        ));
    }

    #[test]
    fn check_digit_routines_match_known_documents() {
        assert!(cnpj_is_valid("32649500000145"));
        assert!(cnpj_is_valid("12345678000195"));
        assert!(!cnpj_is_valid("32649500000144"));
        // Repeated digits always fail regardless of check digits
        assert!(!cnpj_is_valid("11111111111111"));
        assert!(!cnpj_is_valid("3264950000014"));

        assert!(cpf_is_valid("11144477735"));
        assert!(!cpf_is_valid("11144477734"));
        assert!(!cpf_is_valid("00000000000"));
    }
}
