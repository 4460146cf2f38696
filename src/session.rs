//! The design session controller: one per user session, owning the whole
//! upload → style/budget → contact gate → generate → edit → finalize flow.
//! External calls follow a two-phase protocol (`begin_*` hands out a ticket,
//! `complete_*` applies the settlement) so the HTTP layer never holds the
//! session lock across an `.await`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_with::skip_serializing_none;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{BudgetRange, ContactInfo, DesignRequest, DesignStyle, Lead, STYLE_CAP};

pub const MSG_GENERATE_REFUSED: &str = "Không thể tạo hình ảnh. Vui lòng thử lại.";
pub const MSG_GENERATE_UNREACHABLE: &str = "Đã xảy ra lỗi khi kết nối với AI.";
pub const MSG_EDIT_REFUSED: &str = "Không thể chỉnh sửa ảnh. Vui lòng thử lại.";
pub const MSG_EDIT_UNREACHABLE: &str = "Lỗi khi chỉnh sửa.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingContact,
    Generating,
    Results,
    Editing,
    Submitted,
}

/// Rejections the controller hands back to the user. Display strings are the
/// product's user-facing messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Vui lòng tải ảnh hiện trạng lên trước.")]
    MissingImage,
    #[error("Chỉ hỗ trợ ảnh JPG hoặc PNG.")]
    UnsupportedImage,
    #[error("Vui lòng chọn ít nhất một phong cách.")]
    NoStyleSelected,
    #[error("Bạn chỉ được chọn tối đa 3 phong cách để AI phối hợp tốt nhất.")]
    StyleLimitReached,
    #[error("Vui lòng chọn ngân sách dự kiến.")]
    MissingBudget,
    #[error("Vui lòng điền đầy đủ họ tên, số điện thoại và email.")]
    ContactIncomplete,
    #[error("Không có yêu cầu thiết kế nào đang chờ thông tin liên hệ.")]
    NoPendingRequest,
    #[error("AI đang xử lý, vui lòng đợi trong giây lát.")]
    CallInFlight,
    #[error("Vui lòng hoàn tất thông tin liên hệ trước.")]
    GateOpen,
    #[error("Phương án không tồn tại.")]
    InvalidCandidate,
    #[error("Vui lòng nhập yêu cầu chỉnh sửa.")]
    EmptyInstruction,
    #[error("Chưa chọn phương án để chỉnh sửa.")]
    NotEditing,
    #[error("Phiên thiết kế đã hoàn tất. Hãy bắt đầu phiên mới.")]
    SessionClosed,
}

/// What the shell observed when an external call settled.
#[derive(Debug, Clone)]
pub enum CallOutcome<T> {
    /// The service produced a usable result.
    Produced(T),
    /// The service answered but produced nothing usable.
    Refused,
    /// The service could not be reached at all.
    Unreachable,
}

/// How the controller absorbed a settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// Applied; the session advanced.
    Applied,
    /// The call failed; state rolled back, message recorded for the user.
    RolledBack(String),
    /// The session was reset while the call was outstanding; discarded.
    Stale,
}

/// Permission to run one generation call. Carries the request snapshot the
/// engine must be invoked with and the epoch that validates the settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTicket {
    epoch: u64,
    pub request: DesignRequest,
}

/// Permission to run one edit call against the selected candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct EditTicket {
    epoch: u64,
    pub index: usize,
    pub source: String,
    pub instruction: String,
}

/// Outcome of `request_generation`: either the engine may be invoked now, or
/// the contact gate opened and the request was parked behind it.
#[derive(Debug, PartialEq)]
pub enum GenerationStart {
    Launched(GenerationTicket),
    ContactRequired,
}

#[derive(Debug)]
pub struct DesignSession {
    id: Uuid,
    phase: Phase,
    image: Option<String>,
    styles: Vec<DesignStyle>,
    budget: Option<BudgetRange>,
    contact: Option<ContactInfo>,
    candidates: Vec<String>,
    selected: Option<usize>,
    pending_instruction: String,
    deferred: Option<DesignRequest>,
    edit_in_flight: bool,
    fallback: Phase,
    error: Option<String>,
    epoch: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DesignSession {
    pub fn new() -> Self {
        let now = Utc::now();
        DesignSession {
            id: Uuid::new_v4(),
            phase: Phase::Idle,
            image: None,
            styles: Vec::new(),
            budget: None,
            contact: None,
            candidates: Vec::new(),
            selected: None,
            pending_instruction: String::new(),
            deferred: None,
            edit_in_flight: false,
            fallback: Phase::Idle,
            error: None,
            epoch: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn styles(&self) -> &[DesignStyle] {
        &self.styles
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    fn busy(&self) -> bool {
        self.phase == Phase::Generating || self.edit_in_flight
    }

    /// Every user operation except `reset` and reads goes through this gate.
    fn guard_open(&self) -> Result<(), SessionError> {
        if self.busy() {
            return Err(SessionError::CallInFlight);
        }
        match self.phase {
            Phase::Submitted => Err(SessionError::SessionClosed),
            Phase::AwaitingContact => Err(SessionError::GateOpen),
            _ => Ok(()),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// The interactive phase a failed or dismissed call falls back to.
    fn interactive_phase(&self) -> Phase {
        if self.candidates.is_empty() {
            Phase::Idle
        } else {
            Phase::Results
        }
    }

    fn invalidate_results(&mut self) {
        self.candidates.clear();
        self.selected = None;
        self.pending_instruction.clear();
        if matches!(self.phase, Phase::Results | Phase::Editing) {
            self.phase = Phase::Idle;
        }
    }

    /// Replace the source photo. Existing candidates were generated from the
    /// old photo and are invalidated wholesale.
    pub fn set_image(&mut self, image_base64: String) -> Result<(), SessionError> {
        self.guard_open()?;
        self.image = Some(image_base64);
        self.invalidate_results();
        self.error = None;
        self.touch();
        Ok(())
    }

    pub fn clear_image(&mut self) -> Result<(), SessionError> {
        self.guard_open()?;
        self.image = None;
        self.invalidate_results();
        self.touch();
        Ok(())
    }

    /// Add or remove one style. Selecting past the cap is rejected with the
    /// product warning; toggling a selected style off restores capacity.
    pub fn toggle_style(&mut self, style: DesignStyle) -> Result<(), SessionError> {
        self.guard_open()?;
        if let Some(pos) = self.styles.iter().position(|s| *s == style) {
            self.styles.remove(pos);
        } else if self.styles.len() >= STYLE_CAP {
            return Err(SessionError::StyleLimitReached);
        } else {
            self.styles.push(style);
        }
        self.touch();
        Ok(())
    }

    pub fn set_budget(&mut self, budget: BudgetRange) -> Result<(), SessionError> {
        self.guard_open()?;
        self.budget = Some(budget);
        self.touch();
        Ok(())
    }

    fn request_snapshot(&self) -> Result<DesignRequest, SessionError> {
        let source_image = self.image.clone().ok_or(SessionError::MissingImage)?;
        if self.styles.is_empty() {
            return Err(SessionError::NoStyleSelected);
        }
        let budget = self.budget.ok_or(SessionError::MissingBudget)?;
        Ok(DesignRequest { source_image, styles: self.styles.clone(), budget })
    }

    /// Ask for a generation. Validation failures never reach the engine. If
    /// no contact info was captured yet, the gate opens instead and the
    /// request waits behind it.
    pub fn request_generation(&mut self) -> Result<GenerationStart, SessionError> {
        self.guard_open()?;
        let request = self.request_snapshot()?;
        if self.contact.is_none() {
            self.fallback = self.interactive_phase();
            self.deferred = Some(request);
            self.phase = Phase::AwaitingContact;
            self.error = None;
            self.touch();
            return Ok(GenerationStart::ContactRequired);
        }
        Ok(GenerationStart::Launched(self.launch(request)))
    }

    fn launch(&mut self, request: DesignRequest) -> GenerationTicket {
        self.fallback = self.interactive_phase();
        // A new generation collapses the editor; the old set stays valid
        // until the settlement replaces it.
        self.selected = None;
        self.pending_instruction.clear();
        self.phase = Phase::Generating;
        self.error = None;
        self.touch();
        GenerationTicket { epoch: self.epoch, request }
    }

    /// Store contact info (all fields required, captured once) and fire the
    /// generation that was parked behind the gate. Exactly one engine call
    /// results from the user request that opened the gate.
    pub fn submit_contact(&mut self, contact: ContactInfo) -> Result<GenerationTicket, SessionError> {
        if self.phase != Phase::AwaitingContact {
            return Err(SessionError::NoPendingRequest);
        }
        if !contact.is_complete() {
            return Err(SessionError::ContactIncomplete);
        }
        let request = self.deferred.take().ok_or(SessionError::NoPendingRequest)?;
        self.contact = Some(contact);
        Ok(self.launch(request))
    }

    /// Close the gate without submitting; drops the parked request.
    pub fn dismiss_gate(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::AwaitingContact {
            return Err(SessionError::NoPendingRequest);
        }
        self.deferred = None;
        self.phase = self.fallback;
        self.touch();
        Ok(())
    }

    pub fn complete_generation(
        &mut self,
        ticket: &GenerationTicket,
        outcome: CallOutcome<Vec<String>>,
    ) -> Settled {
        if ticket.epoch != self.epoch {
            // The session was reset while the call was out; nothing about the
            // post-reset state may change.
            return Settled::Stale;
        }
        self.touch();
        match outcome {
            CallOutcome::Produced(candidates) if !candidates.is_empty() => {
                self.candidates = candidates;
                self.selected = None;
                self.phase = Phase::Results;
                self.error = None;
                Settled::Applied
            }
            CallOutcome::Produced(_) | CallOutcome::Refused => {
                self.roll_back_generation(MSG_GENERATE_REFUSED)
            }
            CallOutcome::Unreachable => self.roll_back_generation(MSG_GENERATE_UNREACHABLE),
        }
    }

    fn roll_back_generation(&mut self, message: &str) -> Settled {
        self.phase = self.fallback;
        self.error = Some(message.to_string());
        Settled::RolledBack(message.to_string())
    }

    /// Pick one candidate to refine.
    pub fn select_for_edit(&mut self, index: usize) -> Result<(), SessionError> {
        self.guard_open()?;
        if index >= self.candidates.len() {
            return Err(SessionError::InvalidCandidate);
        }
        self.selected = Some(index);
        self.phase = Phase::Editing;
        self.error = None;
        self.touch();
        Ok(())
    }

    /// Leave the editor. The selection is kept: finalization may still cite
    /// the candidate the user last worked on.
    pub fn close_editor(&mut self) -> Result<(), SessionError> {
        self.guard_open()?;
        if self.phase != Phase::Editing {
            return Err(SessionError::NotEditing);
        }
        self.phase = Phase::Results;
        self.touch();
        Ok(())
    }

    /// Start one edit call against the selected candidate.
    pub fn begin_edit(&mut self, instruction: &str) -> Result<EditTicket, SessionError> {
        self.guard_open()?;
        if self.phase != Phase::Editing {
            return Err(SessionError::NotEditing);
        }
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(SessionError::EmptyInstruction);
        }
        let index = self.selected.ok_or(SessionError::NotEditing)?;
        let source = self
            .candidates
            .get(index)
            .cloned()
            .ok_or(SessionError::InvalidCandidate)?;
        self.pending_instruction = instruction.to_string();
        self.edit_in_flight = true;
        self.error = None;
        self.touch();
        Ok(EditTicket {
            epoch: self.epoch,
            index,
            source,
            instruction: instruction.to_string(),
        })
    }

    pub fn complete_edit(&mut self, ticket: &EditTicket, outcome: CallOutcome<String>) -> Settled {
        if ticket.epoch != self.epoch {
            return Settled::Stale;
        }
        self.edit_in_flight = false;
        self.touch();
        match outcome {
            CallOutcome::Produced(blob) if !blob.is_empty() => {
                if let Some(slot) = self.candidates.get_mut(ticket.index) {
                    *slot = blob;
                }
                self.pending_instruction.clear();
                self.error = None;
                Settled::Applied
            }
            CallOutcome::Produced(_) | CallOutcome::Refused => self.roll_back_edit(MSG_EDIT_REFUSED),
            CallOutcome::Unreachable => self.roll_back_edit(MSG_EDIT_UNREACHABLE),
        }
    }

    fn roll_back_edit(&mut self, message: &str) -> Settled {
        // Stay in the editor with the instruction intact so the user can
        // adjust and retry.
        self.error = Some(message.to_string());
        Settled::RolledBack(message.to_string())
    }

    /// Emit the lead snapshot and close the session. The lead is a deep copy:
    /// whatever happens to this session afterwards cannot change it.
    pub fn finalize(&mut self) -> Result<Lead, SessionError> {
        self.guard_open()?;
        let source_image = self.image.clone().ok_or(SessionError::MissingImage)?;
        let budget = self.budget.ok_or(SessionError::MissingBudget)?;
        let contact = self.contact.clone().ok_or(SessionError::ContactIncomplete)?;
        let lead = Lead {
            id: Uuid::new_v4(),
            contact,
            request: DesignRequest {
                source_image,
                styles: self.styles.clone(),
                budget,
            },
            chosen_index: self.selected,
            created_at: Utc::now(),
        };
        self.phase = Phase::Submitted;
        self.error = None;
        self.touch();
        Ok(lead)
    }

    /// Back to a blank session. Whatever call is still outstanding settles
    /// against the old epoch and is discarded.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.phase = Phase::Idle;
        self.image = None;
        self.styles.clear();
        self.budget = None;
        self.contact = None;
        self.candidates.clear();
        self.selected = None;
        self.pending_instruction.clear();
        self.deferred = None;
        self.edit_in_flight = false;
        self.fallback = Phase::Idle;
        self.error = None;
        self.touch();
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
        self.touch();
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            phase: self.phase,
            image_base64: self.image.clone(),
            styles: self.styles.clone(),
            budget: self.budget,
            contact_captured: self.contact.is_some(),
            candidates: self.candidates.clone(),
            selected_index: self.selected,
            pending_instruction: (!self.pending_instruction.is_empty())
                .then(|| self.pending_instruction.clone()),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Default for DesignSession {
    fn default() -> Self {
        Self::new()
    }
}

/// What the client sees of a session.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub phase: Phase,
    pub image_base64: Option<String>,
    pub styles: Vec<DesignStyle>,
    pub budget: Option<BudgetRange>,
    pub contact_captured: bool,
    pub candidates: Vec<String>,
    pub selected_index: Option<usize>,
    pub pending_instruction: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn contact() -> ContactInfo {
        ContactInfo {
            name: "A".into(),
            phone: "0900000000".into(),
            email: "a@x.com".into(),
        }
    }

    /// Image, one style and a budget set; no contact yet.
    fn ready_session() -> DesignSession {
        let mut s = DesignSession::new();
        s.set_image("img1".into()).expect("set image");
        s.toggle_style(DesignStyle::Modern).expect("toggle style");
        s.set_budget(BudgetRange::From50To100).expect("set budget");
        s
    }

    /// Walk a ready session through the gate and a successful generation of
    /// `blobs`.
    fn session_with_results(blobs: &[&str]) -> DesignSession {
        let mut s = ready_session();
        assert!(matches!(
            s.request_generation().expect("request"),
            GenerationStart::ContactRequired
        ));
        let ticket = s.submit_contact(contact()).expect("submit contact");
        let outcome = CallOutcome::Produced(blobs.iter().map(|b| b.to_string()).collect());
        assert_eq!(s.complete_generation(&ticket, outcome), Settled::Applied);
        s
    }

    #[test]
    fn starts_idle_and_empty() {
        let s = DesignSession::new();
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.candidates().is_empty());
        assert!(s.error().is_none());
    }

    #[test]
    fn style_set_never_exceeds_three() {
        let mut s = DesignSession::new();
        s.toggle_style(DesignStyle::Modern).expect("1st");
        s.toggle_style(DesignStyle::Minimalist).expect("2nd");
        s.toggle_style(DesignStyle::Indochine).expect("3rd");
        assert_eq!(
            s.toggle_style(DesignStyle::Tropical),
            Err(SessionError::StyleLimitReached)
        );
        assert_eq!(s.styles().len(), 3);

        // Toggling one off restores capacity.
        s.toggle_style(DesignStyle::Minimalist).expect("remove");
        s.toggle_style(DesignStyle::Tropical).expect("refill");
        assert_eq!(
            s.styles(),
            &[DesignStyle::Modern, DesignStyle::Indochine, DesignStyle::Tropical]
        );
    }

    #[test]
    fn generation_preconditions_short_circuit() {
        let mut s = DesignSession::new();
        assert_eq!(s.request_generation(), Err(SessionError::MissingImage));

        s.set_image("img1".into()).expect("set image");
        assert_eq!(s.request_generation(), Err(SessionError::NoStyleSelected));

        s.toggle_style(DesignStyle::Modern).expect("toggle");
        assert_eq!(s.request_generation(), Err(SessionError::MissingBudget));
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn first_generation_pauses_at_the_contact_gate() {
        let mut s = ready_session();
        match s.request_generation().expect("request") {
            GenerationStart::ContactRequired => {}
            GenerationStart::Launched(_) => panic!("gate should open before the first call"),
        }
        assert_eq!(s.phase(), Phase::AwaitingContact);

        // The gate blocks everything but contact submission and reset.
        assert_eq!(s.toggle_style(DesignStyle::Tropical), Err(SessionError::GateOpen));
        assert_eq!(s.request_generation(), Err(SessionError::GateOpen));
    }

    #[test]
    fn submit_contact_fires_the_parked_request_once() {
        let mut s = ready_session();
        assert!(matches!(
            s.request_generation().expect("request"),
            GenerationStart::ContactRequired
        ));

        let ticket = s.submit_contact(contact()).expect("submit");
        assert_eq!(s.phase(), Phase::Generating);
        assert_eq!(ticket.request.source_image, "img1");
        assert_eq!(ticket.request.styles, vec![DesignStyle::Modern]);
        assert_eq!(ticket.request.budget, BudgetRange::From50To100);

        // No second ticket for the same user request.
        assert_eq!(s.submit_contact(contact()), Err(SessionError::NoPendingRequest));
    }

    #[test]
    fn incomplete_contact_is_rejected_and_gate_stays_open() {
        let mut s = ready_session();
        s.request_generation().expect("request");
        let partial = ContactInfo { name: " ".into(), ..contact() };
        assert_eq!(s.submit_contact(partial), Err(SessionError::ContactIncomplete));
        assert_eq!(s.phase(), Phase::AwaitingContact);
    }

    #[test]
    fn dismissing_the_gate_restores_the_prior_state() {
        let mut s = ready_session();
        s.request_generation().expect("request");
        s.dismiss_gate().expect("dismiss");
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(s.styles(), &[DesignStyle::Modern]);

        // Dismissing from results-backed sessions returns to results.
        let mut s = session_with_results(&["c0", "c1"]);
        s.contact = None;
        s.request_generation().expect("request again");
        assert_eq!(s.phase(), Phase::AwaitingContact);
        s.dismiss_gate().expect("dismiss");
        assert_eq!(s.phase(), Phase::Results);
    }

    #[test]
    fn second_generation_skips_the_gate() {
        let mut s = session_with_results(&["c0", "c1", "c2"]);
        match s.request_generation().expect("request") {
            GenerationStart::Launched(ticket) => {
                assert_eq!(ticket.request.source_image, "img1");
            }
            GenerationStart::ContactRequired => panic!("contact is already captured"),
        }
        assert_eq!(s.phase(), Phase::Generating);
    }

    #[test]
    fn scenario_gated_generation_with_three_candidates() {
        let mut s = DesignSession::new();
        s.set_image("img1".into()).expect("image");
        s.toggle_style(DesignStyle::Modern).expect("style");
        s.set_budget(BudgetRange::From50To100).expect("budget");

        assert!(matches!(
            s.request_generation().expect("request"),
            GenerationStart::ContactRequired
        ));
        assert_eq!(s.phase(), Phase::AwaitingContact);

        let ticket = s.submit_contact(contact()).expect("contact");
        assert_eq!(ticket.request.styles, vec![DesignStyle::Modern]);
        assert_eq!(ticket.request.budget, BudgetRange::From50To100);

        let settled = s.complete_generation(
            &ticket,
            CallOutcome::Produced(vec!["a".into(), "b".into(), "c".into()]),
        );
        assert_eq!(settled, Settled::Applied);
        assert_eq!(s.phase(), Phase::Results);
        assert_eq!(s.candidates().len(), 3);
    }

    #[test]
    fn empty_generation_rolls_back_and_flags_the_error() {
        let mut s = ready_session();
        s.request_generation().expect("request");
        let ticket = s.submit_contact(contact()).expect("contact");

        let settled = s.complete_generation(&ticket, CallOutcome::Produced(vec![]));
        assert_eq!(settled, Settled::RolledBack(MSG_GENERATE_REFUSED.to_string()));
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.candidates().is_empty());
        assert_eq!(s.error(), Some(MSG_GENERATE_REFUSED));

        // Selections survive the failure untouched.
        assert_eq!(s.styles(), &[DesignStyle::Modern]);
        assert_eq!(s.budget, Some(BudgetRange::From50To100));
        assert_eq!(s.image.as_deref(), Some("img1"));
    }

    #[test]
    fn unreachable_generation_uses_the_connection_message() {
        let mut s = ready_session();
        s.request_generation().expect("request");
        let ticket = s.submit_contact(contact()).expect("contact");
        let settled = s.complete_generation(&ticket, CallOutcome::<Vec<String>>::Unreachable);
        assert_eq!(settled, Settled::RolledBack(MSG_GENERATE_UNREACHABLE.to_string()));
        assert_eq!(s.error(), Some(MSG_GENERATE_UNREACHABLE));
    }

    #[test]
    fn failed_regeneration_keeps_the_previous_candidates() {
        let mut s = session_with_results(&["c0", "c1", "c2"]);
        let ticket = match s.request_generation().expect("request") {
            GenerationStart::Launched(t) => t,
            GenerationStart::ContactRequired => panic!("gate closed"),
        };
        let settled = s.complete_generation(&ticket, CallOutcome::Refused);
        assert_eq!(settled, Settled::RolledBack(MSG_GENERATE_REFUSED.to_string()));
        assert_eq!(s.phase(), Phase::Results);
        assert_eq!(s.candidates(), &["c0", "c1", "c2"]);
    }

    #[test]
    fn generation_is_exclusive_while_in_flight() {
        let mut s = session_with_results(&["c0"]);
        s.request_generation().expect("first");
        assert_eq!(s.phase(), Phase::Generating);
        assert_eq!(s.request_generation(), Err(SessionError::CallInFlight));
        assert_eq!(s.toggle_style(DesignStyle::Tropical), Err(SessionError::CallInFlight));
        assert_eq!(s.set_budget(BudgetRange::Over300), Err(SessionError::CallInFlight));
        assert_eq!(s.set_image("img2".into()), Err(SessionError::CallInFlight));
    }

    #[test]
    fn select_for_edit_checks_bounds() {
        let mut s = session_with_results(&["c0", "c1", "c2"]);
        assert_eq!(s.select_for_edit(3), Err(SessionError::InvalidCandidate));
        s.select_for_edit(1).expect("select");
        assert_eq!(s.phase(), Phase::Editing);

        let mut idle = DesignSession::new();
        assert_eq!(idle.select_for_edit(0), Err(SessionError::InvalidCandidate));
    }

    #[test]
    fn edit_replaces_exactly_the_selected_candidate() {
        let mut s = session_with_results(&["orig0", "orig1", "orig2"]);
        s.select_for_edit(1).expect("select");
        let ticket = s.begin_edit("add plants").expect("begin edit");
        assert_eq!(ticket.index, 1);
        assert_eq!(ticket.source, "orig1");
        assert_eq!(ticket.instruction, "add plants");

        let settled = s.complete_edit(&ticket, CallOutcome::Produced("blobX".into()));
        assert_eq!(settled, Settled::Applied);
        assert_eq!(s.candidates(), &["orig0", "blobX", "orig2"]);
        assert_eq!(s.phase(), Phase::Editing);
        assert!(s.view().pending_instruction.is_none());
    }

    #[test]
    fn failed_edit_keeps_set_and_instruction() {
        let mut s = session_with_results(&["orig0", "orig1"]);
        s.select_for_edit(0).expect("select");
        let ticket = s.begin_edit("brighter tones").expect("begin edit");

        let settled = s.complete_edit(&ticket, CallOutcome::Refused);
        assert_eq!(settled, Settled::RolledBack(MSG_EDIT_REFUSED.to_string()));
        assert_eq!(s.candidates(), &["orig0", "orig1"]);
        assert_eq!(s.phase(), Phase::Editing);
        assert_eq!(s.error(), Some(MSG_EDIT_REFUSED));
        assert_eq!(s.view().pending_instruction.as_deref(), Some("brighter tones"));
    }

    #[test]
    fn empty_edit_result_counts_as_refused() {
        let mut s = session_with_results(&["orig0"]);
        s.select_for_edit(0).expect("select");
        let ticket = s.begin_edit("warmer light").expect("begin edit");
        let settled = s.complete_edit(&ticket, CallOutcome::Produced(String::new()));
        assert_eq!(settled, Settled::RolledBack(MSG_EDIT_REFUSED.to_string()));
        assert_eq!(s.candidates(), &["orig0"]);
    }

    #[test]
    fn edit_requires_an_instruction_and_a_selection() {
        let mut s = session_with_results(&["c0"]);
        assert_eq!(s.begin_edit("x"), Err(SessionError::NotEditing));
        s.select_for_edit(0).expect("select");
        assert_eq!(s.begin_edit("   "), Err(SessionError::EmptyInstruction));
    }

    #[test]
    fn one_edit_in_flight_at_a_time() {
        let mut s = session_with_results(&["c0", "c1"]);
        s.select_for_edit(0).expect("select");
        s.begin_edit("first").expect("begin");
        assert_eq!(s.begin_edit("second"), Err(SessionError::CallInFlight));
        assert_eq!(s.select_for_edit(1), Err(SessionError::CallInFlight));
        assert_eq!(s.request_generation(), Err(SessionError::CallInFlight));
    }

    #[test]
    fn closing_the_editor_keeps_the_selection() {
        let mut s = session_with_results(&["c0", "c1"]);
        s.select_for_edit(1).expect("select");
        s.close_editor().expect("close");
        assert_eq!(s.phase(), Phase::Results);
        assert_eq!(s.view().selected_index, Some(1));
    }

    #[test]
    fn replacing_the_image_invalidates_candidates() {
        let mut s = session_with_results(&["c0", "c1"]);
        s.select_for_edit(0).expect("select");
        s.set_image("img2".into()).expect("new image");
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.candidates().is_empty());
        assert_eq!(s.view().selected_index, None);
    }

    #[test]
    fn clearing_the_image_invalidates_candidates() {
        let mut s = session_with_results(&["c0", "c1"]);
        s.select_for_edit(1).expect("select");
        s.clear_image().expect("clear");
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.candidates().is_empty());
        assert!(s.view().image_base64.is_none());
        assert_eq!(s.request_generation(), Err(SessionError::MissingImage));
    }

    #[test]
    fn finalize_requires_contact() {
        let mut s = ready_session();
        assert_eq!(s.finalize(), Err(SessionError::ContactIncomplete));
    }

    #[test]
    fn finalize_emits_a_snapshot_immune_to_reset() {
        let mut s = session_with_results(&["c0", "c1", "c2"]);
        s.select_for_edit(2).expect("select");
        s.close_editor().expect("close");
        let lead = s.finalize().expect("finalize");
        assert_eq!(s.phase(), Phase::Submitted);
        assert_eq!(lead.contact, contact());
        assert_eq!(lead.request.styles, vec![DesignStyle::Modern]);
        assert_eq!(lead.request.budget, BudgetRange::From50To100);
        assert_eq!(lead.chosen_index, Some(2));

        // The session is terminal until reset.
        assert_eq!(s.toggle_style(DesignStyle::Tropical), Err(SessionError::SessionClosed));
        assert_eq!(s.finalize(), Err(SessionError::SessionClosed));

        s.reset();
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.styles().is_empty());

        // The lead still carries the values from the moment of finalization.
        assert_eq!(lead.request.styles, vec![DesignStyle::Modern]);
        assert_eq!(lead.request.budget, BudgetRange::From50To100);
        assert_eq!(lead.request.source_image, "img1");
    }

    #[test]
    fn reset_discards_a_stale_edit_settlement() {
        let mut s = session_with_results(&["c0", "c1", "c2"]);
        s.select_for_edit(1).expect("select");
        let ticket = s.begin_edit("add plants").expect("begin edit");

        s.reset();
        let after_reset = s.view();

        let settled = s.complete_edit(&ticket, CallOutcome::Produced("blobX".into()));
        assert_eq!(settled, Settled::Stale);
        let now = s.view();
        assert_eq!(now.phase, after_reset.phase);
        assert_eq!(now.candidates, after_reset.candidates);
        assert!(now.candidates.is_empty());
        assert!(now.error.is_none());
    }

    #[test]
    fn reset_discards_a_stale_generation_settlement() {
        let mut s = ready_session();
        s.request_generation().expect("request");
        let ticket = s.submit_contact(contact()).expect("contact");

        s.reset();
        let settled =
            s.complete_generation(&ticket, CallOutcome::Produced(vec!["a".into(), "b".into()]));
        assert_eq!(settled, Settled::Stale);
        assert!(s.candidates().is_empty());
        assert_eq!(s.phase(), Phase::Idle);

        // The session is usable again immediately; the next generation runs
        // under the new epoch.
        s.set_image("img2".into()).expect("image");
        s.toggle_style(DesignStyle::Indochine).expect("style");
        s.set_budget(BudgetRange::Over300).expect("budget");
        s.request_generation().expect("request again");
        let ticket2 = s.submit_contact(contact()).expect("contact again");
        assert_eq!(
            s.complete_generation(&ticket2, CallOutcome::Produced(vec!["z".into()])),
            Settled::Applied
        );
        assert_eq!(s.candidates(), &["z"]);
    }

    #[test]
    fn dismiss_error_clears_the_transient_message() {
        let mut s = ready_session();
        s.request_generation().expect("request");
        let ticket = s.submit_contact(contact()).expect("contact");
        s.complete_generation(&ticket, CallOutcome::Refused);
        assert!(s.error().is_some());
        s.dismiss_error();
        assert!(s.error().is_none());
    }

    #[test]
    fn view_reflects_the_session() {
        let mut s = ready_session();
        let view = s.view();
        assert_eq!(view.phase, Phase::Idle);
        assert_eq!(view.styles, vec![DesignStyle::Modern]);
        assert!(!view.contact_captured);
        assert_eq!(view.image_base64.as_deref(), Some("img1"));

        s.request_generation().expect("request");
        s.submit_contact(contact()).expect("contact");
        assert!(s.view().contact_captured);
    }
}
