use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use crate::domain::invoice::{group_thousands, InvoiceRecord};
use crate::errors::{AutomationError, ValidationFailure};

pub const MAX_CREDENTIAL_FILE_BYTES: u64 = 10 * 1024 * 1024;

const RFC_PATTERN: &str = r"^[A-ZÑ&]{3,4}([0-9]{6})[A-Z0-9]{3}$";
const POSTAL_CODE_PATTERN: &str = r"^\d{5}$";
const CURRENCY_PATTERN: &str = r"^\d{1,3}(,\d{3})*(\.\d{2})?$";
const DISALLOWED_PASSWORD_CHARS: [char; 5] = ['<', '>', '\'', '"', '\\'];

static RFC_RE: OnceLock<Option<Regex>> = OnceLock::new();
static POSTAL_CODE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static CURRENCY_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Name and size of a credential file, gathered before validation runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialFileMeta {
    pub name: String,
    pub size_bytes: u64,
}

impl CredentialFileMeta {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self { name: name.into(), size_bytes }
    }

    /// `Ok(None)` when nothing exists at `path`.
    pub async fn gather(path: &Path) -> Result<Option<Self>, AutomationError> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(Some(Self {
                name: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size_bytes: metadata.len(),
            })),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(AutomationError::io(path, source)),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PreflightInput<'a> {
    pub certificate: Option<&'a CredentialFileMeta>,
    pub private_key: Option<&'a CredentialFileMeta>,
    pub password: &'a str,
    pub invoice: &'a InvoiceRecord,
}

/// Structural checks run before any page interaction. Pure and synchronous.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreflightValidator;

impl PreflightValidator {
    pub fn new() -> Self {
        Self
    }

    /// Pattern match plus a real calendar date in the six digit block.
    ///
    /// The date check is deliberately stricter than the portal pattern alone:
    /// a well-shaped RFC such as `ABCD123456XY9` is rejected because `123456`
    /// is not a valid YYMMDD date.
    pub fn validate_rfc(&self, rfc: &str) -> bool {
        let Some(captures) = compiled(&RFC_RE, RFC_PATTERN).and_then(|re| re.captures(rfc)) else {
            return false;
        };
        captures
            .get(1)
            .is_some_and(|digits| NaiveDate::parse_from_str(digits.as_str(), "%y%m%d").is_ok())
    }

    pub fn validate_postal_code(&self, postal_code: &str) -> bool {
        compiled(&POSTAL_CODE_RE, POSTAL_CODE_PATTERN).is_some_and(|re| re.is_match(postal_code))
    }

    pub fn validate_currency(&self, amount: &str) -> bool {
        compiled(&CURRENCY_RE, CURRENCY_PATTERN).is_some_and(|re| re.is_match(amount))
    }

    pub fn validate_quantity(&self, quantity: &str) -> bool {
        quantity.replace(',', "").trim().parse::<f64>().is_ok_and(|parsed| parsed > 0.0)
    }

    fn validate_amount(&self, amount: Decimal) -> bool {
        self.validate_currency(&group_thousands(amount))
    }

    pub fn validate_invoice(&self, invoice: &InvoiceRecord) -> Vec<String> {
        let mut errors = Vec::new();

        if !self.validate_rfc(&invoice.rfc) {
            errors.push("RFC inválido".to_owned());
        }
        if !self.validate_postal_code(&invoice.postal_code) {
            errors.push("Código postal inválido".to_owned());
        }

        let required = [
            ("rfc", invoice.rfc.trim().is_empty()),
            ("codigoPostal", invoice.postal_code.trim().is_empty()),
            ("regimenFiscal", invoice.fiscal_regime.trim().is_empty()),
            ("usoCFDI", invoice.cfdi_use.trim().is_empty()),
            ("concepto", invoice.line_items.is_empty()),
        ];
        for (field, blank) in required {
            if blank {
                errors.push(format!("Campo {field} es requerido"));
            }
        }

        let totals = [
            (invoice.subtotal, "Subtotal inválido"),
            (invoice.transferred_taxes, "Impuestos trasladados inválidos"),
            (invoice.withheld_taxes, "Impuestos retenidos inválidos"),
            (invoice.total, "Total inválido"),
        ];
        for (amount, message) in totals {
            if amount < Decimal::ZERO {
                errors.push(message.to_owned());
            }
        }

        if let Some(line) = invoice.primary_line() {
            if !self.validate_quantity(&group_thousands(line.quantity)) {
                errors.push("Cantidad inválida".to_owned());
            }
            let amounts = [
                (line.unit_value, "Valor unitario inválido"),
                (line.vat_amount, "IVA cobrado inválido"),
                (line.vat_withheld, "Retención IVA inválida"),
                (line.isr_withheld, "Retención ISR inválida"),
            ];
            for (amount, message) in amounts {
                if !self.validate_amount(amount) {
                    errors.push(message.to_owned());
                }
            }
        }

        errors
    }

    pub fn validate_credential_files(
        &self,
        certificate: Option<&CredentialFileMeta>,
        private_key: Option<&CredentialFileMeta>,
    ) -> Vec<String> {
        let mut errors = Vec::new();

        match certificate {
            None => errors.push("Archivo de certificado es requerido".to_owned()),
            Some(file) => {
                if !file.name.to_lowercase().ends_with(".cer") {
                    errors.push("El archivo de certificado debe tener extensión .cer".to_owned());
                }
                if file.size_bytes > MAX_CREDENTIAL_FILE_BYTES {
                    errors.push("El archivo de certificado es demasiado grande".to_owned());
                }
            }
        }

        match private_key {
            None => errors.push("Archivo de llave privada es requerido".to_owned()),
            Some(file) => {
                if !file.name.to_lowercase().ends_with(".key") {
                    errors.push("El archivo de llave privada debe tener extensión .key".to_owned());
                }
                if file.size_bytes > MAX_CREDENTIAL_FILE_BYTES {
                    errors.push("El archivo de llave privada es demasiado grande".to_owned());
                }
            }
        }

        errors
    }

    pub fn validate_password(&self, password: &str) -> Vec<String> {
        let mut errors = Vec::new();

        if password.is_empty() {
            errors.push("La contraseña es requerida".to_owned());
        } else if password.chars().count() < 8 {
            errors.push("La contraseña debe tener al menos 8 caracteres".to_owned());
        }
        if password.contains(DISALLOWED_PASSWORD_CHARS) {
            errors.push("La contraseña contiene caracteres no permitidos".to_owned());
        }

        errors
    }

    /// Runs every check and reports all violations at once.
    pub fn validate(&self, input: PreflightInput<'_>) -> Result<(), ValidationFailure> {
        let mut errors = self.validate_credential_files(input.certificate, input.private_key);
        errors.extend(self.validate_password(input.password));
        errors.extend(self.validate_invoice(input.invoice));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationFailure::new(errors))
        }
    }
}
