use serde::{Deserialize, Serialize};

use crate::config::WorkflowConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStep {
    Preflight,
    RegisterResources,
    SignIn,
    FillForm,
    VerifyTotals,
    ConfirmSignature,
    CaptureArtifact,
    Cleanup,
}

impl BillStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::RegisterResources => "register_resources",
            Self::SignIn => "sign_in",
            Self::FillForm => "fill_form",
            Self::VerifyTotals => "verify_totals",
            Self::ConfirmSignature => "confirm_signature",
            Self::CaptureArtifact => "capture_artifact",
            Self::Cleanup => "cleanup",
        }
    }

    /// Steps a run will attempt under `workflow`, in order.
    pub fn plan(workflow: &WorkflowConfig) -> Vec<BillStep> {
        let mut steps = Vec::with_capacity(8);
        if workflow.preflight {
            steps.push(Self::Preflight);
        }
        steps.extend([Self::RegisterResources, Self::SignIn]);
        if workflow.fill_form {
            steps.extend([Self::FillForm, Self::VerifyTotals]);
        }
        if workflow.confirm_signature {
            steps.push(Self::ConfirmSignature);
        }
        steps.extend([Self::CaptureArtifact, Self::Cleanup]);
        steps
    }
}

/// Field id prefixes on the invoicing form.
pub(crate) mod fields {
    pub const RFC: &str = "rfc";
    pub const POSTAL_CODE: &str = "codigoPostal";
    pub const FISCAL_REGIME: &str = "regimenFiscal";
    pub const CFDI_USE: &str = "usoFactura";

    pub const DESCRIPTION: &str = "concepto_descripcion";
    pub const PRODUCT: &str = "concepto_productoServicio";
    pub const UNIT: &str = "concepto_unidadDeMedida";
    pub const QUANTITY: &str = "concepto_cantidad";
    pub const UNIT_VALUE: &str = "concepto_valorUnitario";
    pub const LINE_ID: &str = "concepto_noIdentificacion";
    pub const TAX: &str = "concepto_impuesto";
    pub const NO_TAX: &str = "concepto_no_impuesto";
    pub const VAT: &str = "concepto_cobradoIVA";
    pub const VAT_WITHHELD: &str = "concepto_retencionIVA";
    pub const ISR_WITHHELD: &str = "concepto_retencionISR";

    pub const SUBTOTAL: &str = "subtotal";
    pub const TRANSFERRED_TOTAL: &str = "impuestos_trasladados_total";
    pub const WITHHELD_TOTAL: &str = "impuestos_retenidos_total";
    pub const TOTAL: &str = "total";

    /// The form always books the line under this tax object code.
    pub const FIXED_TAX_CODE: &str = "02";
}

#[cfg(test)]
mod tests {
    use super::BillStep;
    use crate::config::AppConfig;

    #[test]
    fn default_plan_signs_in_and_captures_only() {
        let plan = BillStep::plan(&AppConfig::default().workflow);
        assert_eq!(
            plan,
            vec![
                BillStep::Preflight,
                BillStep::RegisterResources,
                BillStep::SignIn,
                BillStep::CaptureArtifact,
                BillStep::Cleanup,
            ]
        );
    }

    #[test]
    fn full_plan_verifies_totals_before_confirming() {
        let mut workflow = AppConfig::default().workflow;
        workflow.fill_form = true;
        workflow.confirm_signature = true;

        let plan = BillStep::plan(&workflow);
        let position = |step| plan.iter().position(|planned| *planned == step);

        assert!(position(BillStep::FillForm) < position(BillStep::VerifyTotals));
        assert!(position(BillStep::VerifyTotals) < position(BillStep::ConfirmSignature));
        assert_eq!(plan.last(), Some(&BillStep::Cleanup));
    }
}
