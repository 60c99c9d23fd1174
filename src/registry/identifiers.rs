//! Finnish business and invoicing address identifiers

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("'{0}' is not a Y-tunnus (expected NNNNNNN-N)")]
    BusinessId(String),
    #[error("'{0}' is not an invoicing address (expected '<address> OVT-tunnus' or '<address> IBAN')")]
    InvoicingAddress(String),
}

/// Convert a Y-tunnus (`1234567-8`) to its international VAT id (`FI12345678`)
pub fn ytunnus_to_vat_id(business_id: &str) -> Result<String, IdentifierError> {
    let business_id = business_id.trim();
    let invalid = || IdentifierError::BusinessId(business_id.to_string());

    let (body, check) = business_id.split_once('-').ok_or_else(invalid)?;
    if body.is_empty()
        || check.chars().count() != 1
        || !body.chars().chain(check.chars()).all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    Ok(format!("FI{}{}", body, check))
}

/// Normalise a Tieke style address (`003705090754 OVT-tunnus`,
/// `FI6213763000140986 IBAN`) to the registry form (`OVT:3705090754`,
/// `IBAN:FI6213763000140986`).
pub fn normalize_invoicing_address(raw: &str) -> Result<String, IdentifierError> {
    let invalid = || IdentifierError::InvoicingAddress(raw.to_string());

    let mut parts = raw.split_whitespace();
    let (Some(address), Some(kind), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };

    match kind {
        "OVT-tunnus" => Ok(format!("OVT:{}", address.trim_start_matches('0'))),
        "IBAN" => Ok(format!("IBAN:{}", address)),
        _ => Err(invalid()),
    }
}
