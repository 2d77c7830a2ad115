//! MHC portal driver over the automation bridge
//!
//! The re-route instruction is part of the wire protocol: the bridge
//! watches for the portal's "claim under a different scheme" dialog and
//! reports it as a tagged result, so the submission stage never inspects
//! dialog text.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{DomainPort, Nric, PortError};
use domain_claims::{MemberHandle, MemberLookup, PortalDriver, SaveReceipt};
use domain_visit::{ChargeType, MedicineLine};

use crate::client::BridgeClient;

/// Portal driver backed by the bridge sidecar
#[derive(Debug, Clone)]
pub struct PortalBridge {
    client: BridgeClient,
}

impl PortalBridge {
    pub fn new(client: BridgeClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
enum MemberSearchResponse {
    Found {
        member_id: String,
        context: String,
    },
    NotFound {},
    UseAlternate {
        instruction: String,
        context: String,
    },
}

#[derive(Serialize)]
struct SaveRequest {}

#[derive(Deserialize)]
struct SaveResponse {
    saved: bool,
    submitted: bool,
    reference: Option<String>,
}

#[derive(Deserialize)]
struct Ack {
    #[allow(dead_code)]
    ok: bool,
}

impl DomainPort for PortalBridge {}

#[async_trait]
impl PortalDriver for PortalBridge {
    async fn authenticate(&self) -> Result<(), PortError> {
        let _: Ack = self
            .client
            .post("/portal/session", &serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn select_context(&self, context: &str) -> Result<(), PortError> {
        let _: Ack = self
            .client
            .post("/portal/context", &serde_json::json!({ "context": context }))
            .await?;
        Ok(())
    }

    async fn find_member(&self, nric: &Nric) -> Result<MemberLookup, PortError> {
        let response: MemberSearchResponse = self
            .client
            .post(
                "/portal/members/search",
                &serde_json::json!({ "nric": nric.as_str() }),
            )
            .await?;
        Ok(match response {
            MemberSearchResponse::Found { member_id, context } => {
                MemberLookup::Found(MemberHandle { member_id, context })
            }
            MemberSearchResponse::NotFound {} => MemberLookup::NotFound,
            MemberSearchResponse::UseAlternate {
                instruction,
                context,
            } => MemberLookup::UseAlternate {
                instruction,
                context,
            },
        })
    }

    async fn open_claim_form(&self, member: &MemberHandle) -> Result<(), PortError> {
        let _: Ack = self
            .client
            .post(
                "/portal/claim/open",
                &serde_json::json!({ "member_id": member.member_id }),
            )
            .await?;
        Ok(())
    }

    async fn fill_visit_date(&self, date: NaiveDate) -> Result<(), PortError> {
        let _: Ack = self
            .client
            .post("/portal/claim/visit-date", &serde_json::json!({ "date": date }))
            .await?;
        Ok(())
    }

    async fn select_charge_type(&self, charge_type: ChargeType) -> Result<(), PortError> {
        let _: Ack = self
            .client
            .post(
                "/portal/claim/charge-type",
                &serde_json::json!({ "charge_type": charge_type.as_str() }),
            )
            .await?;
        Ok(())
    }

    async fn fill_consultation_fee(&self, amount: Decimal) -> Result<(), PortError> {
        let _: Ack = self
            .client
            .post(
                "/portal/claim/consultation-fee",
                &serde_json::json!({ "amount": amount }),
            )
            .await?;
        Ok(())
    }

    async fn fill_medical_certificate(
        &self,
        days: u32,
        start_date: Option<NaiveDate>,
    ) -> Result<(), PortError> {
        let _: Ack = self
            .client
            .post(
                "/portal/claim/medical-certificate",
                &serde_json::json!({ "days": days, "start_date": start_date }),
            )
            .await?;
        Ok(())
    }

    async fn select_diagnosis(&self, code: Option<&str>, text: &str) -> Result<(), PortError> {
        let _: Ack = self
            .client
            .post(
                "/portal/claim/diagnosis",
                &serde_json::json!({ "code": code, "text": text }),
            )
            .await?;
        Ok(())
    }

    async fn add_medicine(&self, line: &MedicineLine) -> Result<(), PortError> {
        let _: Ack = self
            .client
            .post(
                "/portal/claim/medicines",
                &serde_json::json!({ "name": line.name, "quantity": line.quantity }),
            )
            .await?;
        Ok(())
    }

    async fn save_draft(&self) -> Result<SaveReceipt, PortError> {
        let response: SaveResponse = self
            .client
            .post("/portal/claim/save", &SaveRequest {})
            .await?;
        Ok(SaveReceipt {
            saved: response.saved,
            submitted: response.submitted,
            reference: response.reference,
        })
    }

    async fn end_session(&self) -> Result<(), PortError> {
        let _: Ack = self
            .client
            .post("/portal/session/end", &serde_json::json!({}))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_search_wire_format() {
        let found: MemberSearchResponse = serde_json::from_str(
            r#"{"result":"found","member_id":"M-1","context":"default"}"#,
        )
        .unwrap();
        assert!(matches!(found, MemberSearchResponse::Found { .. }));

        let reroute: MemberSearchResponse = serde_json::from_str(
            r#"{"result":"use_alternate","instruction":"Claim under MHC Corporate","context":"corporate"}"#,
        )
        .unwrap();
        assert!(matches!(reroute, MemberSearchResponse::UseAlternate { .. }));

        let missing: MemberSearchResponse =
            serde_json::from_str(r#"{"result":"not_found"}"#).unwrap();
        assert!(matches!(missing, MemberSearchResponse::NotFound {}));
    }
}
