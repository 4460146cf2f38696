use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use reqwest::Client;
use uuid::Uuid;

use crate::models::Lead;

/// In-memory book of captured leads. Forwarding to the CRM webhook is
/// best-effort: the lead is recorded first and a delivery failure only logs.
#[derive(Clone)]
pub struct LeadBook {
    store: Arc<RwLock<HashMap<Uuid, Lead>>>,
    client: Client,
    webhook_url: Option<String>,
}

impl LeadBook {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            store: Arc::default(),
            client: Client::new(),
            webhook_url,
        }
    }

    pub fn record(&self, lead: Lead) {
        let lead_id = lead.id;
        let payload = webhook_payload(&lead);
        self.store.write().insert(lead_id, lead);
        tracing::info!("📦 Lead {} recorded ({} total)", lead_id, self.len());

        if let Some(url) = self.webhook_url.clone() {
            let client = self.client.clone();
            tokio::spawn(async move {
                match client.post(&url).json(&payload).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        tracing::info!("✅ Lead {} forwarded to webhook", lead_id);
                    }
                    Ok(resp) => {
                        tracing::error!("❌ Webhook rejected lead {}: {}", lead_id, resp.status());
                    }
                    Err(e) => {
                        tracing::error!("❌ Webhook call for lead {} failed: {}", lead_id, e);
                    }
                }
            });
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Lead> {
        self.store.read().get(id).cloned()
    }

    /// All captured leads, newest first.
    pub fn list(&self) -> Vec<Lead> {
        let mut leads: Vec<Lead> = self.store.read().values().cloned().collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        leads
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }
}

/// What the CRM receives. Labels instead of enum tags, and no room photo:
/// webhook bodies stay small and log-friendly.
fn webhook_payload(lead: &Lead) -> serde_json::Value {
    serde_json::json!({
        "lead_id": lead.id,
        "name": lead.contact.name,
        "phone": lead.contact.phone,
        "email": lead.contact.email,
        "styles": lead.request.styles.iter().map(|s| s.label()).collect::<Vec<_>>(),
        "budget": lead.request.budget.label(),
        "chosen_index": lead.chosen_index,
        "created_at": lead.created_at,
    })
}
