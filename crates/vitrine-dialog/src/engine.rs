//! Dialog engine: wires the state machine to search, forms, and transport.
//!
//! One turn = classify the inbound event, dispatch it against the
//! transition table, execute the bound action under the session lock.
//! Pipeline and persistence failures map to user-visible messages;
//! delivery failures are logged and emitted as events but never change
//! flow state.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use vitrine_core::error::Result;
use vitrine_core::events::DomainEvent;
use vitrine_core::types::{
    ChatId, MessageId, PageStep, ProblemReport, SearchOutcome, SearchStage, Timestamp,
};
use vitrine_core::VitrineError;
use vitrine_forms::ReportSink;
use vitrine_search::SearchPipeline;

use crate::render;
use crate::session::{FlowData, ReportDraft, SearchSession, Session, SessionStore};
use crate::state::{classify_text, dispatch, ChatState, ControlAction, DialogAction, Trigger};
use crate::transport::{ChatTransport, ControlSet};

/// Buffered domain events per subscriber before lagging.
const EVENT_CHANNEL_CAPACITY: usize = 256;

enum PageDirection {
    Forward,
    Backward,
}

/// Central coordinator for all chats.
pub struct DialogEngine {
    pipeline: Arc<SearchPipeline>,
    sink: Arc<dyn ReportSink>,
    transport: Arc<dyn ChatTransport>,
    sessions: SessionStore,
    events: broadcast::Sender<DomainEvent>,
    notify_chat: Option<ChatId>,
}

impl DialogEngine {
    pub fn new(
        pipeline: Arc<SearchPipeline>,
        sink: Arc<dyn ReportSink>,
        transport: Arc<dyn ChatTransport>,
        notify_chat: Option<ChatId>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            pipeline,
            sink,
            transport,
            sessions: SessionStore::new(),
            events,
            notify_chat,
        }
    }

    /// Subscribe to domain events emitted by this engine.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// The search pipeline this engine runs queries through.
    pub fn pipeline(&self) -> &SearchPipeline {
        &self.pipeline
    }

    /// Emit the startup lifecycle event to subscribers.
    pub fn announce_start(&self, version: &str, config_path: &str) {
        self.emit(DomainEvent::ApplicationStarted {
            version: version.to_string(),
            config_path: config_path.to_string(),
            timestamp: Timestamp::now(),
        });
    }

    /// Handle an inbound text message for one chat.
    pub async fn handle_message(&self, chat: &ChatId, text: &str) -> Result<()> {
        self.handle_trigger(chat, classify_text(text)).await
    }

    /// Handle an inbound control press for one chat.
    pub async fn handle_control(&self, chat: &ChatId, action: ControlAction) -> Result<()> {
        self.handle_trigger(chat, Trigger::from(action)).await
    }

    async fn handle_trigger(&self, chat: &ChatId, trigger: Trigger) -> Result<()> {
        let session = self.sessions.session(chat)?;
        let mut session = session.lock().await;

        let action = dispatch(session.state, &trigger);
        debug!(chat = %chat.0, state = ?session.state, action = ?action, "Dispatching trigger");

        match action {
            DialogAction::ShowMenu => self.show_menu(&mut session).await,
            DialogAction::CancelFlow => self.cancel_flow(&mut session).await,
            DialogAction::PromptQuery => self.prompt_query(&mut session).await,
            DialogAction::PromptName => self.prompt_name(&mut session).await,
            DialogAction::RunSearch(query) => self.run_search(&mut session, &query).await,
            DialogAction::PageNext => self.page(&mut session, PageDirection::Forward).await,
            DialogAction::PagePrev => self.page(&mut session, PageDirection::Backward).await,
            DialogAction::LeaveResults => self.leave_results(&mut session).await,
            DialogAction::CaptureName(name) => self.capture_name(&mut session, name).await,
            DialogAction::CaptureContact(contact) => {
                self.capture_contact(&mut session, contact).await
            }
            DialogAction::SubmitReport(problem) => {
                self.submit_report(&mut session, problem).await
            }
            DialogAction::Ignore => {
                debug!(chat = %chat.0, state = ?session.state, "Trigger outside the transition table, ignored");
                Ok(())
            }
        }
    }

    // -- Menu and cancel --

    async fn show_menu(&self, session: &mut Session) -> Result<()> {
        session.reset();
        self.deliver_text(
            &session.chat,
            render::MENU_PROMPT,
            Some(&render::menu_controls()),
        )
        .await;
        Ok(())
    }

    async fn cancel_flow(&self, session: &mut Session) -> Result<()> {
        session.reset();
        self.emit(DomainEvent::FlowCancelled {
            chat: session.chat.clone(),
            timestamp: Timestamp::now(),
        });
        self.deliver_text(&session.chat, render::CANCELLED, None).await;
        self.deliver_text(
            &session.chat,
            render::MENU_PROMPT,
            Some(&render::menu_controls()),
        )
        .await;
        Ok(())
    }

    // -- Search flow --

    async fn prompt_query(&self, session: &mut Session) -> Result<()> {
        session.state = ChatState::AwaitingQuery;
        session.flow = FlowData::None;
        self.deliver_text(&session.chat, render::QUERY_PROMPT, None).await;
        Ok(())
    }

    async fn run_search(&self, session: &mut Session, query: &str) -> Result<()> {
        let chat = session.chat.clone();
        self.deliver_text(&chat, render::SEARCH_PROGRESS, None).await;

        let started = Instant::now();
        match self.pipeline.run(query).await {
            Ok(SearchOutcome::Found(results)) => {
                self.emit(DomainEvent::SearchPerformed {
                    chat: chat.clone(),
                    query: query.to_string(),
                    result_count: results.len(),
                    latency_ms: started.elapsed().as_millis() as u64,
                    timestamp: Timestamp::now(),
                });
                let mut search = SearchSession {
                    results,
                    card: None,
                };
                self.show_card(&chat, &mut search).await;
                session.state = ChatState::BrowsingResults;
                session.flow = FlowData::Search(search);
            }
            Ok(SearchOutcome::NoResults) => {
                self.emit(DomainEvent::SearchPerformed {
                    chat: chat.clone(),
                    query: query.to_string(),
                    result_count: 0,
                    latency_ms: started.elapsed().as_millis() as u64,
                    timestamp: Timestamp::now(),
                });
                session.reset();
                self.deliver_text(&chat, render::SEARCH_NO_RESULTS, None).await;
            }
            Err(e) => {
                let stage = match &e {
                    VitrineError::Encoding(_) => SearchStage::Embedding,
                    _ => SearchStage::Index,
                };
                warn!(chat = %chat.0, error = %e, stage = stage.label(), "Search failed");
                self.emit(DomainEvent::SearchFailed {
                    chat: chat.clone(),
                    stage,
                    reason: e.to_string(),
                    timestamp: Timestamp::now(),
                });
                session.reset();
                let message = match stage {
                    SearchStage::Embedding => render::SEARCH_ENCODING_FAILED,
                    SearchStage::Index => render::SEARCH_INDEX_FAILED,
                };
                self.deliver_text(&chat, message, None).await;
            }
        }
        Ok(())
    }

    // -- Pagination --

    async fn page(&self, session: &mut Session, direction: PageDirection) -> Result<()> {
        let chat = session.chat.clone();
        let search = match &mut session.flow {
            FlowData::Search(search) => search,
            _ => {
                debug!(chat = %chat.0, "Pagination control with no result set");
                return Ok(());
            }
        };

        let step = match direction {
            PageDirection::Forward => search.results.advance(),
            PageDirection::Backward => search.results.retreat(),
        };

        match step {
            PageStep::Moved => {
                if self.refresh_card(&chat, search).await {
                    self.emit(DomainEvent::ResultPaged {
                        chat: chat.clone(),
                        cursor: search.results.cursor(),
                        result_count: search.results.len(),
                        timestamp: Timestamp::now(),
                    });
                } else {
                    // Keep the cursor aligned with the card still on screen.
                    match direction {
                        PageDirection::Forward => {
                            search.results.retreat();
                        }
                        PageDirection::Backward => {
                            search.results.advance();
                        }
                    }
                }
            }
            PageStep::AtUpperBound => {
                self.deliver_text(&chat, render::AT_LAST_ITEM, None).await;
            }
            PageStep::AtLowerBound => {
                self.deliver_text(&chat, render::AT_FIRST_ITEM, None).await;
            }
        }
        Ok(())
    }

    async fn leave_results(&self, session: &mut Session) -> Result<()> {
        session.reset();
        self.deliver_text(
            &session.chat,
            render::BACK_TO_MENU,
            Some(&render::menu_controls()),
        )
        .await;
        Ok(())
    }

    /// Fresh-send the current item card. Returns delivery success.
    async fn show_card(&self, chat: &ChatId, search: &mut SearchSession) -> bool {
        let item = search.results.current().clone();
        let caption = render::item_card(&item);
        let controls = render::result_controls(&item);
        let sent = match item.primary_photo() {
            Some(photo) => {
                self.transport
                    .send_photo(chat, photo, &caption, Some(&controls))
                    .await
            }
            None => self.transport.send_text(chat, &caption, Some(&controls)).await,
        };
        match sent {
            Ok(id) => {
                search.card = Some(id);
                true
            }
            Err(e) => {
                self.delivery_failed(chat, &e);
                false
            }
        }
    }

    /// Re-render the card in place, falling back to a fresh send when the
    /// edit is rejected. Returns false only when both paths failed.
    async fn refresh_card(&self, chat: &ChatId, search: &mut SearchSession) -> bool {
        if let Some(card) = search.card {
            let item = search.results.current().clone();
            let caption = render::item_card(&item);
            let controls = render::result_controls(&item);
            match self
                .transport
                .edit_message(chat, card, &caption, item.primary_photo(), Some(&controls))
                .await
            {
                Ok(()) => return true,
                Err(e) => {
                    warn!(chat = %chat.0, message = card.0, error = %e, "Card edit failed, sending a fresh card");
                }
            }
        }
        self.show_card(chat, search).await
    }

    // -- Report flow --

    async fn prompt_name(&self, session: &mut Session) -> Result<()> {
        session.state = ChatState::AwaitingName;
        session.flow = FlowData::Report(ReportDraft::default());
        self.deliver_text(&session.chat, render::NAME_PROMPT, None).await;
        Ok(())
    }

    async fn capture_name(&self, session: &mut Session, name: String) -> Result<()> {
        let draft = match &mut session.flow {
            FlowData::Report(draft) => draft,
            _ => {
                debug!(chat = %session.chat.0, "Name received with no report draft");
                return Ok(());
            }
        };
        draft.name = Some(name);
        session.state = ChatState::AwaitingPhone;
        self.deliver_text(&session.chat, render::CONTACT_PROMPT, None).await;
        Ok(())
    }

    async fn capture_contact(&self, session: &mut Session, contact: String) -> Result<()> {
        let draft = match &mut session.flow {
            FlowData::Report(draft) => draft,
            _ => {
                debug!(chat = %session.chat.0, "Contact received with no report draft");
                return Ok(());
            }
        };
        draft.contact = Some(contact);
        session.state = ChatState::AwaitingProblem;
        self.deliver_text(&session.chat, render::PROBLEM_PROMPT, None).await;
        Ok(())
    }

    async fn submit_report(&self, session: &mut Session, problem: String) -> Result<()> {
        let chat = session.chat.clone();
        let (name, contact) = match &session.flow {
            FlowData::Report(draft) => (
                draft.name.clone().unwrap_or_default(),
                draft.contact.clone().unwrap_or_default(),
            ),
            _ => {
                debug!(chat = %chat.0, "Problem received with no report draft");
                return Ok(());
            }
        };
        let report = ProblemReport::new(name, contact, problem);

        // Forward first: a notification miss must not block the durable
        // write, and a failed write must not suppress the heads-up.
        if let Some(notify) = &self.notify_chat {
            if let Err(e) = self
                .transport
                .send_text(notify, &render::notification_text(&report), None)
                .await
            {
                warn!(chat = %notify.0, error = %e, "Report notification failed");
                self.emit(DomainEvent::DeliveryFailed {
                    chat: notify.clone(),
                    reason: e.to_string(),
                    timestamp: Timestamp::now(),
                });
            }
        }

        match self.sink.append(&report).await {
            Ok(()) => {
                info!(chat = %chat.0, "Problem report recorded");
                self.emit(DomainEvent::ReportSubmitted {
                    chat: chat.clone(),
                    timestamp: Timestamp::now(),
                });
                session.reset();
                self.deliver_text(&chat, render::REPORT_THANKS, Some(&render::menu_controls()))
                    .await;
            }
            Err(e) => {
                warn!(chat = %chat.0, error = %e, "Problem report persistence failed");
                self.emit(DomainEvent::ReportPersistFailed {
                    chat: chat.clone(),
                    reason: e.to_string(),
                    timestamp: Timestamp::now(),
                });
                // Stay at the final step so resending the problem text
                // retries the submission.
                self.deliver_text(&chat, render::REPORT_FAILED, None).await;
            }
        }
        Ok(())
    }

    // -- Private helpers --

    /// Send text, treating delivery failure as a logged event only.
    async fn deliver_text(
        &self,
        chat: &ChatId,
        text: &str,
        controls: Option<&ControlSet>,
    ) -> Option<MessageId> {
        match self.transport.send_text(chat, text, controls).await {
            Ok(id) => Some(id),
            Err(e) => {
                self.delivery_failed(chat, &e);
                None
            }
        }
    }

    fn delivery_failed(&self, chat: &ChatId, error: &VitrineError) {
        warn!(chat = %chat.0, error = %error, "Message delivery failed");
        self.emit(DomainEvent::DeliveryFailed {
            chat: chat.clone(),
            reason: error.to_string(),
            timestamp: Timestamp::now(),
        });
    }

    fn emit(&self, event: DomainEvent) {
        // Send fails only when nobody is subscribed.
        let _ = self.events.send(event);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use vitrine_core::config::SearchConfig;
    use vitrine_core::types::CatalogItem;
    use vitrine_forms::MemorySink;
    use vitrine_search::{
        build_flat_index, CatalogStore, EmbeddingService, IndexHit, MockEmbedding,
        SearchPipeline, VectorIndex,
    };

    use crate::transport::{MockTransport, SentKind};

    const OPS_CHAT: &str = "ops";

    fn chat(id: &str) -> ChatId {
        ChatId(id.to_string())
    }

    fn catalog_item(n: usize) -> CatalogItem {
        CatalogItem {
            title: format!("Item {}", n),
            category: "Gifts".to_string(),
            description: format!("Description for item {}", n),
            price: Some(format!("{}00", n + 1)),
            photos: vec![format!("https://example.com/photo-{}.jpg", n)],
            url: Some(format!("https://example.com/item/{}", n)),
        }
    }

    async fn make_engine(
        items: Vec<CatalogItem>,
    ) -> (DialogEngine, Arc<MockTransport>, Arc<MemorySink>) {
        let catalog = Arc::new(CatalogStore::from_items(items));
        let embedder = MockEmbedding::new();
        let index = Arc::new(build_flat_index(&embedder, &catalog).await.unwrap());
        let pipeline = Arc::new(SearchPipeline::new(
            embedder,
            index,
            catalog,
            &SearchConfig::default(),
        ));
        let transport = Arc::new(MockTransport::new());
        let sink = Arc::new(MemorySink::new());
        let engine = DialogEngine::new(
            pipeline,
            Arc::clone(&sink) as Arc<dyn ReportSink>,
            Arc::clone(&transport) as Arc<dyn ChatTransport>,
            Some(chat(OPS_CHAT)),
        );
        (engine, transport, sink)
    }

    fn make_engine_with_index(
        embedder: impl EmbeddingService + 'static,
        index: Arc<dyn VectorIndex>,
        items: Vec<CatalogItem>,
    ) -> (DialogEngine, Arc<MockTransport>, Arc<MemorySink>) {
        let catalog = Arc::new(CatalogStore::from_items(items));
        let pipeline = Arc::new(SearchPipeline::new(
            embedder,
            index,
            catalog,
            &SearchConfig::default(),
        ));
        let transport = Arc::new(MockTransport::new());
        let sink = Arc::new(MemorySink::new());
        let engine = DialogEngine::new(
            pipeline,
            Arc::clone(&sink) as Arc<dyn ReportSink>,
            Arc::clone(&transport) as Arc<dyn ChatTransport>,
            Some(chat(OPS_CHAT)),
        );
        (engine, transport, sink)
    }

    async fn state_of(engine: &DialogEngine, id: &ChatId) -> ChatState {
        engine.sessions().session(id).unwrap().lock().await.state
    }

    async fn card_of(engine: &DialogEngine, id: &ChatId) -> Option<MessageId> {
        let session = engine.sessions().session(id).unwrap();
        let session = session.lock().await;
        match &session.flow {
            FlowData::Search(search) => search.card,
            _ => None,
        }
    }

    async fn cursor_of(engine: &DialogEngine, id: &ChatId) -> Option<usize> {
        let session = engine.sessions().session(id).unwrap();
        let session = session.lock().await;
        match &session.flow {
            FlowData::Search(search) => Some(search.results.cursor()),
            _ => None,
        }
    }

    async fn enter_browsing(engine: &DialogEngine, id: &ChatId) {
        engine.handle_message(id, render::LABEL_BROWSE).await.unwrap();
        engine.handle_message(id, "gift puzzles").await.unwrap();
    }

    struct FailingEmbedder;

    impl EmbeddingService for FailingEmbedder {
        fn embed(
            &self,
            _text: &str,
        ) -> impl std::future::Future<Output = std::result::Result<Vec<f32>, VitrineError>> + Send
        {
            std::future::ready(Err(VitrineError::Encoding("embedder offline".to_string())))
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    struct CountingIndex {
        calls: Arc<AtomicUsize>,
    }

    impl VectorIndex for CountingIndex {
        fn search(
            &self,
            _query: &[f32],
            k: usize,
        ) -> std::result::Result<Vec<IndexHit>, VitrineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                IndexHit {
                    position: -1,
                    distance: 0.0
                };
                k
            ])
        }

        fn len(&self) -> usize {
            0
        }
    }

    struct FailingIndex;

    impl VectorIndex for FailingIndex {
        fn search(
            &self,
            _query: &[f32],
            _k: usize,
        ) -> std::result::Result<Vec<IndexHit>, VitrineError> {
            Err(VitrineError::Index("index offline".to_string()))
        }

        fn len(&self) -> usize {
            0
        }
    }

    // ---- Menu and prompts ----

    #[tokio::test]
    async fn test_start_resets_and_shows_menu() {
        let (engine, transport, _) = make_engine(vec![catalog_item(0)]).await;
        let id = chat("u1");

        engine.handle_message(&id, "/start").await.unwrap();

        assert_eq!(state_of(&engine, &id).await, ChatState::Idle);
        let last = transport.last().unwrap();
        assert_eq!(last.text, render::MENU_PROMPT);
        let controls = last.controls.unwrap();
        assert_eq!(controls.rows.len(), 2);
    }

    #[tokio::test]
    async fn test_browse_label_prompts_for_query() {
        let (engine, transport, _) = make_engine(vec![catalog_item(0)]).await;
        let id = chat("u1");

        engine.handle_message(&id, render::LABEL_BROWSE).await.unwrap();

        assert_eq!(state_of(&engine, &id).await, ChatState::AwaitingQuery);
        assert_eq!(transport.last().unwrap().text, render::QUERY_PROMPT);
    }

    // ---- Search outcomes ----

    #[tokio::test]
    async fn test_search_sends_progress_then_photo_card() {
        let (engine, transport, _) =
            make_engine(vec![catalog_item(0), catalog_item(1), catalog_item(2)]).await;
        let id = chat("u1");

        enter_browsing(&engine, &id).await;

        assert_eq!(state_of(&engine, &id).await, ChatState::BrowsingResults);
        assert!(card_of(&engine, &id).await.is_some());
        assert_eq!(cursor_of(&engine, &id).await, Some(0));

        let sent = transport.sent();
        assert_eq!(sent[1].text, render::SEARCH_PROGRESS);
        let card = &sent[2];
        assert!(matches!(card.kind, SentKind::Photo(_)));
        assert!(card.text.starts_with("Item "));
        assert!(card.text.contains("Price: "));
        // Link row plus the previous/menu/next row.
        assert_eq!(card.controls.as_ref().unwrap().rows.len(), 2);
    }

    #[tokio::test]
    async fn test_search_over_empty_catalog_reports_no_results() {
        let (engine, transport, _) = make_engine(vec![]).await;
        let id = chat("u1");

        enter_browsing(&engine, &id).await;

        assert_eq!(state_of(&engine, &id).await, ChatState::Idle);
        assert_eq!(transport.last().unwrap().text, render::SEARCH_NO_RESULTS);
    }

    #[tokio::test]
    async fn test_empty_query_fails_encoding_without_index_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let index = Arc::new(CountingIndex {
            calls: Arc::clone(&calls),
        });
        let (engine, transport, _) =
            make_engine_with_index(MockEmbedding::new(), index, vec![catalog_item(0)]);
        let id = chat("u1");

        engine.handle_message(&id, render::LABEL_BROWSE).await.unwrap();
        engine.handle_message(&id, "").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(state_of(&engine, &id).await, ChatState::Idle);
        assert_eq!(
            transport.last().unwrap().text,
            render::SEARCH_ENCODING_FAILED
        );
    }

    #[tokio::test]
    async fn test_embedder_failure_reports_encoding_message() {
        let calls = Arc::new(AtomicUsize::new(0));
        let index = Arc::new(CountingIndex {
            calls: Arc::clone(&calls),
        });
        let (engine, transport, _) =
            make_engine_with_index(FailingEmbedder, index, vec![catalog_item(0)]);
        let id = chat("u1");

        engine.handle_message(&id, render::LABEL_BROWSE).await.unwrap();
        engine.handle_message(&id, "puzzles").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(state_of(&engine, &id).await, ChatState::Idle);
        assert_eq!(
            transport.last().unwrap().text,
            render::SEARCH_ENCODING_FAILED
        );
    }

    #[tokio::test]
    async fn test_index_failure_reports_search_unavailable() {
        let (engine, transport, _) = make_engine_with_index(
            MockEmbedding::new(),
            Arc::new(FailingIndex),
            vec![catalog_item(0)],
        );
        let id = chat("u1");

        engine.handle_message(&id, render::LABEL_BROWSE).await.unwrap();
        engine.handle_message(&id, "puzzles").await.unwrap();

        assert_eq!(state_of(&engine, &id).await, ChatState::Idle);
        assert_eq!(transport.last().unwrap().text, render::SEARCH_INDEX_FAILED);
    }

    // ---- Pagination ----

    #[tokio::test]
    async fn test_next_edits_card_in_place() {
        let (engine, transport, _) =
            make_engine(vec![catalog_item(0), catalog_item(1), catalog_item(2)]).await;
        let id = chat("u1");
        enter_browsing(&engine, &id).await;
        let card = card_of(&engine, &id).await.unwrap();

        engine.handle_control(&id, ControlAction::Next).await.unwrap();

        assert_eq!(cursor_of(&engine, &id).await, Some(1));
        let last = transport.last().unwrap();
        assert_eq!(last.kind, SentKind::Edit(card));
        assert_eq!(card_of(&engine, &id).await, Some(card));
    }

    #[tokio::test]
    async fn test_single_item_boundaries_signal_without_moving() {
        let (engine, transport, _) = make_engine(vec![catalog_item(0)]).await;
        let id = chat("u1");
        enter_browsing(&engine, &id).await;

        engine.handle_control(&id, ControlAction::Next).await.unwrap();
        assert_eq!(transport.last().unwrap().text, render::AT_LAST_ITEM);

        engine.handle_control(&id, ControlAction::Prev).await.unwrap();
        assert_eq!(transport.last().unwrap().text, render::AT_FIRST_ITEM);

        assert_eq!(cursor_of(&engine, &id).await, Some(0));
        assert_eq!(state_of(&engine, &id).await, ChatState::BrowsingResults);
        let edits = transport
            .sent()
            .into_iter()
            .filter(|m| matches!(m.kind, SentKind::Edit(_)))
            .count();
        assert_eq!(edits, 0);
    }

    #[tokio::test]
    async fn test_edit_failure_falls_back_to_fresh_send() {
        let (engine, transport, _) =
            make_engine(vec![catalog_item(0), catalog_item(1)]).await;
        let id = chat("u1");
        enter_browsing(&engine, &id).await;
        let original_card = card_of(&engine, &id).await.unwrap();

        transport.set_fail_edits(true);
        engine.handle_control(&id, ControlAction::Next).await.unwrap();

        assert_eq!(cursor_of(&engine, &id).await, Some(1));
        let last = transport.last().unwrap();
        assert!(matches!(last.kind, SentKind::Photo(_)));
        let new_card = card_of(&engine, &id).await.unwrap();
        assert_ne!(new_card, original_card);
        assert_eq!(last.id, new_card);
    }

    #[tokio::test]
    async fn test_total_render_failure_reverts_cursor() {
        let (engine, transport, _) =
            make_engine(vec![catalog_item(0), catalog_item(1)]).await;
        let id = chat("u1");
        enter_browsing(&engine, &id).await;
        let mut events = engine.subscribe_events();

        transport.set_fail_edits(true);
        transport.set_fail_sends(true);
        engine.handle_control(&id, ControlAction::Next).await.unwrap();

        assert_eq!(cursor_of(&engine, &id).await, Some(0));
        assert_eq!(state_of(&engine, &id).await, ChatState::BrowsingResults);
        let event = events.try_recv().unwrap();
        assert_eq!(event.event_name(), "delivery_failed");
    }

    #[tokio::test]
    async fn test_menu_control_discards_results() {
        let (engine, transport, _) =
            make_engine(vec![catalog_item(0), catalog_item(1)]).await;
        let id = chat("u1");
        enter_browsing(&engine, &id).await;

        engine.handle_control(&id, ControlAction::Menu).await.unwrap();

        assert_eq!(state_of(&engine, &id).await, ChatState::Idle);
        assert_eq!(cursor_of(&engine, &id).await, None);
        let last = transport.last().unwrap();
        assert_eq!(last.text, render::BACK_TO_MENU);
        assert!(last.controls.is_some());
    }

    // ---- Report flow ----

    #[tokio::test]
    async fn test_report_flow_persists_one_record_and_notifies_first() {
        let (engine, transport, sink) = make_engine(vec![catalog_item(0)]).await;
        let id = chat("u1");

        engine.handle_message(&id, render::LABEL_REPORT).await.unwrap();
        assert_eq!(state_of(&engine, &id).await, ChatState::AwaitingName);

        engine.handle_message(&id, "Ivan Petrov").await.unwrap();
        assert_eq!(state_of(&engine, &id).await, ChatState::AwaitingPhone);

        engine.handle_message(&id, "@ivanp").await.unwrap();
        assert_eq!(state_of(&engine, &id).await, ChatState::AwaitingProblem);

        engine.handle_message(&id, "Item not delivered").await.unwrap();
        assert_eq!(state_of(&engine, &id).await, ChatState::Idle);

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name, "Ivan Petrov");
        assert_eq!(reports[0].contact, "@ivanp");
        assert_eq!(reports[0].problem, "Item not delivered");

        let sent = transport.sent();
        let notify_pos = sent
            .iter()
            .position(|m| m.chat == chat(OPS_CHAT))
            .expect("notification sent");
        let thanks_pos = sent
            .iter()
            .position(|m| m.text == render::REPORT_THANKS)
            .expect("thanks sent");
        assert!(notify_pos < thanks_pos);
        assert!(sent[notify_pos].text.starts_with("New problem report:"));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_block_persistence() {
        let (engine, transport, sink) = make_engine(vec![catalog_item(0)]).await;
        let id = chat("u1");

        engine.handle_message(&id, render::LABEL_REPORT).await.unwrap();
        engine.handle_message(&id, "Ivan Petrov").await.unwrap();
        engine.handle_message(&id, "@ivanp").await.unwrap();

        transport.set_fail_sends(true);
        engine.handle_message(&id, "Item not delivered").await.unwrap();

        assert_eq!(sink.reports().len(), 1);
        assert_eq!(state_of(&engine, &id).await, ChatState::Idle);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_retry_path_open() {
        let (engine, transport, sink) = make_engine(vec![catalog_item(0)]).await;
        let id = chat("u1");

        engine.handle_message(&id, render::LABEL_REPORT).await.unwrap();
        engine.handle_message(&id, "Ivan Petrov").await.unwrap();
        engine.handle_message(&id, "@ivanp").await.unwrap();

        sink.set_failing(true);
        engine.handle_message(&id, "Item not delivered").await.unwrap();

        assert_eq!(state_of(&engine, &id).await, ChatState::AwaitingProblem);
        assert!(sink.reports().is_empty());
        assert_eq!(transport.last().unwrap().text, render::REPORT_FAILED);

        // Resending the problem text retries the submission.
        sink.set_failing(false);
        engine.handle_message(&id, "Item not delivered").await.unwrap();

        assert_eq!(state_of(&engine, &id).await, ChatState::Idle);
        assert_eq!(sink.reports().len(), 1);
        assert_eq!(transport.last().unwrap().text, render::REPORT_THANKS);
    }

    #[tokio::test]
    async fn test_cancel_discards_report_draft() {
        let (engine, transport, sink) = make_engine(vec![catalog_item(0)]).await;
        let id = chat("u1");

        engine.handle_message(&id, render::LABEL_REPORT).await.unwrap();
        engine.handle_message(&id, "Ivan Petrov").await.unwrap();
        engine.handle_message(&id, "/cancel").await.unwrap();

        assert_eq!(state_of(&engine, &id).await, ChatState::Idle);
        assert!(transport.texts().contains(&render::CANCELLED.to_string()));

        // The flow is gone; further text is outside the table.
        engine.handle_message(&id, "@ivanp").await.unwrap();
        assert_eq!(state_of(&engine, &id).await, ChatState::Idle);
        assert!(sink.reports().is_empty());
    }

    // ---- Ignored triggers and isolation ----

    #[tokio::test]
    async fn test_unmatched_triggers_send_nothing() {
        let (engine, transport, _) = make_engine(vec![catalog_item(0)]).await;
        let id = chat("u1");

        engine.handle_message(&id, "hello there").await.unwrap();
        engine.handle_control(&id, ControlAction::Next).await.unwrap();

        assert!(transport.sent().is_empty());
        assert_eq!(state_of(&engine, &id).await, ChatState::Idle);
    }

    #[tokio::test]
    async fn test_free_text_while_browsing_is_ignored() {
        let (engine, transport, _) =
            make_engine(vec![catalog_item(0), catalog_item(1)]).await;
        let id = chat("u1");
        enter_browsing(&engine, &id).await;
        let before = transport.sent().len();

        engine.handle_message(&id, "another query").await.unwrap();

        assert_eq!(transport.sent().len(), before);
        assert_eq!(state_of(&engine, &id).await, ChatState::BrowsingResults);
        assert_eq!(cursor_of(&engine, &id).await, Some(0));
    }

    #[tokio::test]
    async fn test_sessions_do_not_interfere() {
        let (engine, _, _) = make_engine(vec![catalog_item(0), catalog_item(1)]).await;
        let browsing = chat("browsing");
        let reporting = chat("reporting");

        enter_browsing(&engine, &browsing).await;
        engine
            .handle_message(&reporting, render::LABEL_REPORT)
            .await
            .unwrap();

        engine
            .handle_control(&browsing, ControlAction::Next)
            .await
            .unwrap();

        assert_eq!(state_of(&engine, &browsing).await, ChatState::BrowsingResults);
        assert_eq!(cursor_of(&engine, &browsing).await, Some(1));
        assert_eq!(state_of(&engine, &reporting).await, ChatState::AwaitingName);
    }

    // ---- Events ----

    #[tokio::test]
    async fn test_search_and_paging_emit_events() {
        let (engine, _, _) =
            make_engine(vec![catalog_item(0), catalog_item(1), catalog_item(2)]).await;
        let id = chat("u1");
        let mut events = engine.subscribe_events();

        enter_browsing(&engine, &id).await;
        engine.handle_control(&id, ControlAction::Next).await.unwrap();

        let first = events.try_recv().unwrap();
        match first {
            DomainEvent::SearchPerformed {
                result_count,
                query,
                ..
            } => {
                assert_eq!(result_count, 3);
                assert_eq!(query, "gift puzzles");
            }
            other => panic!("Expected SearchPerformed, got {:?}", other),
        }

        let second = events.try_recv().unwrap();
        match second {
            DomainEvent::ResultPaged { cursor, .. } => assert_eq!(cursor, 1),
            other => panic!("Expected ResultPaged, got {:?}", other),
        }
    }
}
