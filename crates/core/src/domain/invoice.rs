use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// One bill as supplied by the caller. Field names on the wire follow the
/// portal's own vocabulary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub rfc: String,
    #[serde(rename = "razonSocial", default, skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(rename = "codigoPostal")]
    pub postal_code: String,
    #[serde(rename = "regimenFiscal")]
    pub fiscal_regime: String,
    #[serde(rename = "usoCFDI")]
    pub cfdi_use: String,
    #[serde(rename = "concepto")]
    pub line_items: Vec<LineItem>,
    pub total: Decimal,
    pub subtotal: Decimal,
    #[serde(rename = "impuestosTrasladados")]
    pub transferred_taxes: Decimal,
    #[serde(rename = "impuestosRetenidos")]
    pub withheld_taxes: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "producto")]
    pub product_code: String,
    #[serde(rename = "unidad")]
    pub unit_code: String,
    #[serde(rename = "cantidad")]
    pub quantity: Decimal,
    #[serde(rename = "valor")]
    pub unit_value: Decimal,
    #[serde(rename = "id")]
    pub line_id: u64,
    #[serde(rename = "impuesto")]
    pub tax_code: String,
    #[serde(rename = "iva")]
    pub vat_amount: Decimal,
    #[serde(rename = "retIva")]
    pub vat_withheld: Decimal,
    #[serde(rename = "retIsr")]
    pub isr_withheld: Decimal,
}

/// The four totals as the portal renders them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExpectedTotals {
    pub subtotal: String,
    pub transferred_taxes: String,
    pub withheld_taxes: String,
    pub total: String,
}

impl InvoiceRecord {
    /// Only the first line item is ever typed into the form.
    pub fn primary_line(&self) -> Option<&LineItem> {
        self.line_items.first()
    }

    pub fn expected_totals(&self) -> ExpectedTotals {
        ExpectedTotals {
            subtotal: format_currency(self.subtotal),
            transferred_taxes: format_currency(self.transferred_taxes),
            withheld_taxes: format_currency(self.withheld_taxes),
            total: format_currency(self.total),
        }
    }
}

/// `7200` → `7,200.00`, rounding half away from zero at two places.
pub fn format_currency(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    group_thousands(rounded)
}

/// Inserts thousands separators and keeps the value's own scale:
/// `7200` → `7,200`, `1234.5` → `1,234.5`.
pub fn group_thousands(amount: Decimal) -> String {
    let rendered = amount.abs().to_string();
    let (integer, fraction) = match rendered.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (rendered.as_str(), None),
    };

    let mut grouped = String::with_capacity(rendered.len() + integer.len() / 3 + 1);
    if amount.is_sign_negative() && !amount.is_zero() {
        grouped.push('-');
    }
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(fraction) = fraction {
        grouped.push('.');
        grouped.push_str(fraction);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::{format_currency, group_thousands, InvoiceRecord};

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).unwrap_or_default()
    }

    #[test]
    fn currency_uses_grouping_and_two_places() {
        assert_eq!(format_currency(dec("7200")), "7,200.00");
        assert_eq!(format_currency(dec("576")), "576.00");
        assert_eq!(format_currency(dec("473.76")), "473.76");
        assert_eq!(format_currency(dec("7302.235")), "7,302.24");
        assert_eq!(format_currency(dec("1234567.8")), "1,234,567.80");
        assert_eq!(format_currency(dec("0")), "0.00");
    }

    #[test]
    fn grouping_preserves_scale() {
        assert_eq!(group_thousands(dec("7200")), "7,200");
        assert_eq!(group_thousands(dec("100.5")), "100.5");
        assert_eq!(group_thousands(dec("576.00")), "576.00");
        assert_eq!(group_thousands(dec("-1500")), "-1,500");
    }

    #[test]
    fn deserializes_portal_schema_and_renders_totals() {
        let raw = r#"{
            "rfc": "GODE561231GR8",
            "razonSocial": "Cliente Ejemplo",
            "codigoPostal": "06600",
            "regimenFiscal": "612",
            "usoCFDI": "G03",
            "concepto": [{
                "descripcion": "Servicios de consultoría",
                "producto": "80111600",
                "unidad": "E48",
                "cantidad": 1,
                "valor": 7200,
                "id": 1,
                "impuesto": "02",
                "iva": 576,
                "retIva": 0,
                "retIsr": 473.76
            }],
            "total": 7302.24,
            "subtotal": 7200,
            "impuestosTrasladados": 576,
            "impuestosRetenidos": 473.76
        }"#;

        let invoice: InvoiceRecord = match serde_json::from_str(raw) {
            Ok(invoice) => invoice,
            Err(error) => panic!("invoice should parse: {error}"),
        };

        assert_eq!(invoice.business_name.as_deref(), Some("Cliente Ejemplo"));
        assert_eq!(invoice.primary_line().map(|line| line.line_id), Some(1));

        let totals = invoice.expected_totals();
        assert_eq!(totals.subtotal, "7,200.00");
        assert_eq!(totals.transferred_taxes, "576.00");
        assert_eq!(totals.withheld_taxes, "473.76");
        assert_eq!(totals.total, "7,302.24");
    }
}
