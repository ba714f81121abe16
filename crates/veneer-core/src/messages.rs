//! Message boundary
//!
//! JSON requests from the popup and options pages, tagged by `action`.
//! Every response is wrapped in a [`CommandResult`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use veneer_policy::{
    effective_policy, normalize_domain, DomainPolicy, EffectivePolicy, IdentityPreset,
    PolicyUpdate,
};

use crate::engine::Engine;
use crate::Result;

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

impl<T> From<Result<T>> for CommandResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => CommandResult::ok(data),
            Err(e) => CommandResult::err(e.to_string()),
        }
    }
}

/// Preset fields as sent by the options page; the key travels separately
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetInput {
    pub name: String,
    pub user_agent: String,
    #[serde(default)]
    pub referer: String,
}

impl PresetInput {
    fn into_preset(self, key: &str) -> IdentityPreset {
        IdentityPreset::new(key, self.name, self.user_agent, self.referer)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Everything the popup needs for the page it was opened on
    GetSettings { url: String },
    GetEffectivePolicy { domain: String },
    SetPreset {
        key: String,
        preset: Option<PresetInput>,
    },
    AddPreset {
        name: String,
        user_agent: String,
        #[serde(default)]
        referer: String,
    },
    /// Replace the whole preset map
    UpdatePresets { presets: BTreeMap<String, PresetInput> },
    SetDomainPolicy {
        domain: String,
        #[serde(default)]
        update: PolicyUpdate,
    },
    ClearDomainPolicy { domain: String },
    ListPolicies,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSettings {
    /// `None` when the page URL has no usable host
    pub domain: Option<String>,
    pub policy: Option<EffectivePolicy>,
    pub presets: Vec<IdentityPreset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Page(PageSettings),
    Effective(Option<EffectivePolicy>),
    Preset(IdentityPreset),
    Policy(DomainPolicy),
    Policies(Vec<DomainPolicy>),
    Cleared { removed: bool },
    Done,
}

pub fn dispatch(engine: &Engine, request: Request) -> CommandResult<Response> {
    tracing::debug!(request = ?request, "Handling message");
    handle(engine, request).into()
}

fn handle(engine: &Engine, request: Request) -> Result<Response> {
    match request {
        Request::GetSettings { url } => {
            // One snapshot so the policy and preset list agree
            let store = engine.snapshot();
            Ok(Response::Page(PageSettings {
                domain: normalize_domain(&url),
                policy: effective_policy(&store, &url),
                presets: store.presets().values().cloned().collect(),
            }))
        }
        Request::GetEffectivePolicy { domain } => {
            Ok(Response::Effective(engine.effective_policy(&domain)))
        }
        Request::SetPreset { key, preset } => {
            engine.set_preset(&key, preset.map(|input| input.into_preset(&key)))?;
            Ok(Response::Done)
        }
        Request::AddPreset {
            name,
            user_agent,
            referer,
        } => Ok(Response::Preset(engine.add_preset(
            &name,
            &user_agent,
            &referer,
        )?)),
        Request::UpdatePresets { presets } => {
            let presets = presets
                .into_iter()
                .map(|(key, input)| input.into_preset(&key))
                .collect();
            engine.replace_presets(presets)?;
            Ok(Response::Done)
        }
        Request::SetDomainPolicy { domain, update } => {
            Ok(Response::Policy(engine.set_domain_policy(&domain, &update)?))
        }
        Request::ClearDomainPolicy { domain } => Ok(Response::Cleared {
            removed: engine.clear_domain_policy(&domain)?,
        }),
        Request::ListPolicies => Ok(Response::Policies(engine.policies())),
    }
}

/// Decode a JSON request, run it and encode the result
pub fn handle_json(engine: &Engine, request: &str) -> String {
    let result = match serde_json::from_str::<Request>(request) {
        Ok(request) => dispatch(engine, request),
        Err(e) => CommandResult::err(format!("Invalid request: {}", e)),
    };

    serde_json::to_string(&result).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to encode response");
        r#"{"success":false,"data":null,"error":"Failed to encode response"}"#.to_string()
    })
}
