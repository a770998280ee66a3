// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The RPC configuration source (spec §4.3, §6): the seven `ConfigControl`
//! methods, request-id extraction, and page-token encode/decode.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{info, warn};
use uuid::Uuid;

use ctlplane_common::Context;
use ctlplane_core::config::Config;
use ctlplane_core::lifecycle::{BroadcastMode, LifecycleState, LifecycleSupervisor, Runnable};
use ctlplane_core::orchestrator::SagaOrchestrator;
use ctlplane_core::participant::ParticipantState;
use ctlplane_core::siphon::SiphonSender;
use ctlplane_core::storage::{ListFilter, TransactionStorage};
use ctlplane_core::transaction::{Source, Transaction, TransactionId, TxState};

use ctlplane_proto::configctl::config_control_server::ConfigControl;
use ctlplane_proto::configctl::{
    ClearConfigTransactionsRequest, ClearConfigTransactionsResponse, ConfigTransaction,
    DomainConfig, GetConfigRequest, GetConfigResponse, GetConfigTransactionRequest,
    GetConfigTransactionResponse, GetCurrentConfigTransactionRequest,
    GetCurrentConfigTransactionResponse, ListConfigTransactionsRequest,
    ListConfigTransactionsResponse, ParticipantStatus, TransactionSource, TransactionState,
    UpdateConfigRequest, UpdateConfigResponse, ValidateConfigRequest, ValidateConfigResponse,
};

const REQUEST_ID_KEYS: [&str; 3] = ["request-id", "x-request-id", "requestid"];
const DEFAULT_PAGE_SIZE: i32 = 10;
const MAX_PAGE_SIZE: i32 = 100;

fn extract_request_id<T>(req: &Request<T>) -> String {
    let metadata = req.metadata();
    for key in REQUEST_ID_KEYS {
        if let Some(value) = metadata.get(key) {
            if let Ok(s) = value.to_str() {
                if !s.is_empty() {
                    return s.to_string();
                }
            }
        }
    }
    Uuid::now_v6(&[0, 0, 0, 0, 0, 0]).to_string()
}

fn proto_to_config(domain: Option<DomainConfig>) -> Option<Config> {
    domain.map(|d| Config::new(d.version, d.payload))
}

fn config_to_proto(config: &Config) -> DomainConfig {
    DomainConfig {
        version: config.version.clone(),
        payload: config.payload.clone(),
    }
}

fn source_to_proto(source: Source) -> TransactionSource {
    match source {
        Source::File => TransactionSource::SourceFile,
        Source::Api => TransactionSource::SourceApi,
        Source::Test => TransactionSource::SourceTest,
    }
}

fn proto_to_source_filter(value: i32) -> Option<Source> {
    match TransactionSource::try_from(value).unwrap_or(TransactionSource::SourceUnspecified) {
        TransactionSource::SourceUnspecified => None,
        TransactionSource::SourceFile => Some(Source::File),
        TransactionSource::SourceApi => Some(Source::Api),
        TransactionSource::SourceTest => Some(Source::Test),
    }
}

fn state_to_proto(state: TxState) -> TransactionState {
    match state {
        TxState::Created => TransactionState::StateCreated,
        TxState::Validating => TransactionState::StateValidating,
        TxState::Validated => TransactionState::StateValidated,
        TxState::Executing => TransactionState::StateExecuting,
        TxState::Succeeded => TransactionState::StateSucceeded,
        TxState::Completed => TransactionState::StateCompleted,
        TxState::Compensating => TransactionState::StateCompensating,
        TxState::Compensated => TransactionState::StateCompensated,
        TxState::Error => TransactionState::StateError,
    }
}

fn proto_to_state_filter(value: i32) -> Option<TxState> {
    match TransactionState::try_from(value).unwrap_or(TransactionState::StateUnspecified) {
        TransactionState::StateUnspecified => None,
        TransactionState::StateCreated => Some(TxState::Created),
        TransactionState::StateValidating => Some(TxState::Validating),
        TransactionState::StateValidated => Some(TxState::Validated),
        TransactionState::StateExecuting => Some(TxState::Executing),
        TransactionState::StateSucceeded => Some(TxState::Succeeded),
        TransactionState::StateCompleted => Some(TxState::Completed),
        TransactionState::StateCompensating => Some(TxState::Compensating),
        TransactionState::StateCompensated => Some(TxState::Compensated),
        TransactionState::StateError => Some(TxState::Error),
    }
}

fn participant_state_to_proto(state: ParticipantState) -> ctlplane_proto::configctl::ParticipantState {
    use ctlplane_proto::configctl::ParticipantState as P;
    match state {
        ParticipantState::NotStarted => P::ParticipantNotStarted,
        ParticipantState::Executing => P::ParticipantExecuting,
        ParticipantState::Succeeded => P::ParticipantSucceeded,
        ParticipantState::Failed => P::ParticipantFailed,
        ParticipantState::Compensating => P::ParticipantCompensating,
        ParticipantState::Compensated => P::ParticipantCompensated,
    }
}

fn tx_to_proto(tx: &Transaction, participants: &HashMap<String, ParticipantState>) -> ConfigTransaction {
    let mut names: Vec<&String> = participants.keys().collect();
    names.sort();
    ConfigTransaction {
        id: tx.id().to_string(),
        source: source_to_proto(tx.source()) as i32,
        source_detail: tx.source_detail().to_string(),
        config: Some(config_to_proto(tx.config())),
        is_valid: tx.is_valid().unwrap_or(false),
        state: state_to_proto(tx.state()) as i32,
        created_at: tx.created_at().to_rfc3339(),
        participants: names
            .into_iter()
            .map(|name| ParticipantStatus {
                name: name.clone(),
                state: participant_state_to_proto(participants[name]) as i32,
            })
            .collect(),
    }
}

#[derive(Serialize, Deserialize)]
struct PageToken {
    offset: usize,
    page_size: i32,
    state: i32,
    source: i32,
}

fn encode_page_token(token: &PageToken) -> String {
    let json = serde_json::to_vec(token).expect("PageToken always serializes");
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
}

fn decode_page_token(raw: &str) -> Result<PageToken, Status> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| Status::invalid_argument("malformed page token"))?;
    serde_json::from_slice(&bytes).map_err(|_| Status::invalid_argument("malformed page token"))
}

fn clamp_page_size(requested: i32) -> i32 {
    if requested < 1 {
        DEFAULT_PAGE_SIZE
    } else if requested > MAX_PAGE_SIZE {
        MAX_PAGE_SIZE
    } else {
        requested
    }
}

pub struct RpcService {
    storage: Arc<TransactionStorage>,
    orchestrator: Arc<SagaOrchestrator>,
    siphon: SiphonSender<Arc<Transaction>>,
    lifecycle: LifecycleSupervisor,
    internal_ctx: Mutex<Option<Context>>,
}

impl RpcService {
    pub fn new(
        storage: Arc<TransactionStorage>,
        orchestrator: Arc<SagaOrchestrator>,
        siphon: SiphonSender<Arc<Transaction>>,
    ) -> Self {
        Self {
            storage,
            orchestrator,
            siphon,
            lifecycle: LifecycleSupervisor::new(),
            internal_ctx: Mutex::new(None),
        }
    }

    fn snapshot(&self, tx: &Transaction) -> ConfigTransaction {
        let participants = self
            .orchestrator
            .transaction_status(tx.id())
            .map(|s| s.participants)
            .unwrap_or_default();
        tx_to_proto(tx, &participants)
    }

    /// The context publish calls should race against: the component's own
    /// internal ctx if `run` has started, otherwise a context that never
    /// cancels (the service can still be exercised standalone in tests).
    fn publish_ctx(&self) -> Context {
        self.internal_ctx
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_default()
    }
}

#[tonic::async_trait]
impl ConfigControl for RpcService {
    async fn update_config(
        &self,
        request: Request<UpdateConfigRequest>,
    ) -> Result<Response<UpdateConfigResponse>, Status> {
        let request_id = extract_request_id(&request);
        let config = proto_to_config(request.into_inner().config)
            .ok_or_else(|| Status::invalid_argument("config is required"))?;

        let tx = Arc::new(Transaction::new(Source::Api, request_id.clone(), config.clone()));
        self.storage.register(tx.clone());
        tx.begin_validation()
            .expect("Created -> Validating is always legal");

        if let Err(e) = config.validate() {
            tx.complete_validation(false, Some(e.to_string()))
                .expect("Validating -> Error is always legal");
            return Ok(Response::new(UpdateConfigResponse {
                success: false,
                error: e.to_string(),
                transaction_id: tx.id().to_string(),
                config: Some(config_to_proto(&config)),
            }));
        }
        tx.complete_validation(true, None)
            .expect("Validating -> Validated is always legal");

        let ctx = self.publish_ctx();
        if self.siphon.send(tx.clone(), &ctx).await.is_err() {
            warn!(transaction = %tx.id(), "update_config publish cancelled by shutdown");
            return Ok(Response::new(UpdateConfigResponse {
                success: false,
                error: "service shutting down".to_string(),
                transaction_id: tx.id().to_string(),
                config: Some(config_to_proto(&config)),
            }));
        }

        info!(transaction = %tx.id(), %request_id, "update_config published");
        Ok(Response::new(UpdateConfigResponse {
            success: true,
            error: String::new(),
            transaction_id: tx.id().to_string(),
            config: Some(config_to_proto(&config)),
        }))
    }

    async fn validate_config(
        &self,
        request: Request<ValidateConfigRequest>,
    ) -> Result<Response<ValidateConfigResponse>, Status> {
        // Never constructs a transaction (spec §4.2, S5): `Validate()` is
        // called directly on the converted config.
        let config = proto_to_config(request.into_inner().config)
            .ok_or_else(|| Status::invalid_argument("config is required"))?;
        match config.validate() {
            Ok(()) => Ok(Response::new(ValidateConfigResponse {
                valid: true,
                error: String::new(),
            })),
            Err(e) => Ok(Response::new(ValidateConfigResponse {
                valid: false,
                error: e.to_string(),
            })),
        }
    }

    async fn get_config(
        &self,
        _request: Request<GetConfigRequest>,
    ) -> Result<Response<GetConfigResponse>, Status> {
        let config = self
            .storage
            .current()
            .map(|tx| config_to_proto(tx.config()))
            .unwrap_or_else(|| DomainConfig {
                version: ctlplane_core::config::SUPPORTED_VERSION.to_string(),
                payload: Vec::new(),
            });
        Ok(Response::new(GetConfigResponse { config: Some(config) }))
    }

    async fn get_current_config_transaction(
        &self,
        _request: Request<GetCurrentConfigTransactionRequest>,
    ) -> Result<Response<GetCurrentConfigTransactionResponse>, Status> {
        match self.storage.current() {
            Some(tx) => Ok(Response::new(GetCurrentConfigTransactionResponse {
                present: true,
                transaction: Some(self.snapshot(&tx)),
            })),
            None => Ok(Response::new(GetCurrentConfigTransactionResponse {
                present: false,
                transaction: None,
            })),
        }
    }

    async fn list_config_transactions(
        &self,
        request: Request<ListConfigTransactionsRequest>,
    ) -> Result<Response<ListConfigTransactionsResponse>, Status> {
        let req = request.into_inner();
        let page_size = clamp_page_size(req.page_size);

        let (offset, state_filter, source_filter) = if req.page_token.is_empty() {
            (0usize, req.state_filter, req.source_filter)
        } else {
            let token = decode_page_token(&req.page_token)?;
            if token.state != req.state_filter || token.source != req.source_filter {
                return Err(Status::invalid_argument(
                    "filters in page token do not match filters in this request",
                ));
            }
            (token.offset, req.state_filter, req.source_filter)
        };

        let filter = ListFilter {
            state: proto_to_state_filter(state_filter),
            source: proto_to_source_filter(source_filter),
        };
        let (page, total) = self.storage.list(filter, offset, page_size as usize);
        let next_offset = offset + page.len();
        let next_page_token = if next_offset < total {
            encode_page_token(&PageToken {
                offset: next_offset,
                page_size,
                state: state_filter,
                source: source_filter,
            })
        } else {
            String::new()
        };

        Ok(Response::new(ListConfigTransactionsResponse {
            transactions: page.iter().map(|tx| self.snapshot(tx)).collect(),
            next_page_token,
        }))
    }

    async fn get_config_transaction(
        &self,
        request: Request<GetConfigTransactionRequest>,
    ) -> Result<Response<GetConfigTransactionResponse>, Status> {
        let id_raw = request.into_inner().id;
        if id_raw.is_empty() {
            return Err(Status::invalid_argument("id is required"));
        }
        let id: TransactionId = id_raw
            .parse()
            .map_err(|_| Status::invalid_argument("id is not a valid transaction id"))?;
        let tx = self
            .storage
            .get(id)
            .ok_or_else(|| Status::not_found(format!("transaction {id_raw} not found")))?;
        Ok(Response::new(GetConfigTransactionResponse {
            transaction: Some(self.snapshot(&tx)),
        }))
    }

    async fn clear_config_transactions(
        &self,
        request: Request<ClearConfigTransactionsRequest>,
    ) -> Result<Response<ClearConfigTransactionsResponse>, Status> {
        let keep_last = request.into_inner().keep_last.max(0) as usize;
        let cleared = self.storage.clear(keep_last);
        Ok(Response::new(ClearConfigTransactionsResponse {
            cleared: cleared as u64,
        }))
    }
}

#[async_trait]
impl Runnable for RpcService {
    async fn run(&self, ctx: Context) -> anyhow::Result<()> {
        let internal = ctx.child();
        *self.internal_ctx.lock().unwrap() = Some(internal.clone());
        self.lifecycle.boot().await?;
        self.lifecycle.mark_running().await?;
        internal.cancelled().await;
        self.lifecycle.begin_stop().await?;
        self.lifecycle.mark_stopped().await?;
        Ok(())
    }

    fn stop(&self) {
        if let Some(ctx) = self.internal_ctx.lock().unwrap().as_ref() {
            ctx.cancel();
        }
    }

    fn get_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn get_state_chan(&self, ctx: Context, mode: BroadcastMode) -> ReceiverStream<String> {
        self.lifecycle.state_chan(ctx, mode)
    }
}
