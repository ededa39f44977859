use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FlowSettings;
use crate::error::FunnelError;
use crate::metrics::record_lead_submission;
use crate::models::{
    Answers, Assignment, ContactForm, FunnelEvent, LeadSubmission, QuizQuestion, ResolvedQuiz,
    SubmitOutcome,
};
use crate::services::analytics_service::Analytics;
use crate::services::backend_client::FunnelBackend;
use crate::services::experiment_service::ExperimentService;
use crate::utils::utm::UtmParams;

pub const SUBMIT_SUCCESS_NOTICE: &str = "Thank you! Redirecting...";
pub const SUBMIT_FAILED_FALLBACK: &str = "Failed to submit. Please try again.";

/// Where the visitor is in the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// 1-based question index.
    Question(usize),
    Form,
    Submitted,
}

/// Synchronous quiz state. Every transition returns the events it produced;
/// delivering them and scheduling delays is the caller's job.
#[derive(Debug, Clone)]
pub struct QuizMachine {
    quiz: ResolvedQuiz,
    step: Step,
    answers: Answers,
    selected: Option<String>,
    pending: Option<Step>,
    form: ContactForm,
    submitting: bool,
    completion_reported: bool,
}

impl QuizMachine {
    pub fn new(quiz: ResolvedQuiz) -> Self {
        let step = if quiz.question_count() == 0 {
            Step::Form
        } else {
            Step::Question(1)
        };
        Self {
            quiz,
            step,
            answers: Answers::new(),
            selected: None,
            pending: None,
            form: ContactForm::default(),
            submitting: false,
            completion_reported: false,
        }
    }

    pub fn quiz(&self) -> &ResolvedQuiz {
        &self.quiz
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn total_steps(&self) -> usize {
        self.quiz.total_steps()
    }

    /// 1-based position for progress display; the form is the last step.
    pub fn step_number(&self) -> usize {
        match self.step {
            Step::Question(index) => index,
            Step::Form | Step::Submitted => self.total_steps(),
        }
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        match self.step {
            Step::Question(index) => self.quiz.question(index),
            _ => None,
        }
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    /// Option shown as active on the current question.
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn form(&self) -> &ContactForm {
        &self.form
    }

    pub fn has_pending_transition(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Record an answer for the current question and queue the next step.
    ///
    /// Selecting again before the transition fires replaces the answer.
    pub fn select_answer(&mut self, answer: &str) -> Result<Vec<FunnelEvent>, FunnelError> {
        let Step::Question(index) = self.step else {
            return Err(FunnelError::NotAtQuestion);
        };

        let known = self
            .quiz
            .question(index)
            .is_some_and(|q| q.options.iter().any(|option| option == answer));
        if !known {
            return Err(FunnelError::UnknownOption {
                step: index,
                answer: answer.to_string(),
            });
        }

        self.answers.record(index, answer);
        self.selected = Some(answer.to_string());
        self.pending = Some(if index < self.quiz.question_count() {
            Step::Question(index + 1)
        } else {
            Step::Form
        });

        Ok(vec![FunnelEvent::StepCompleted {
            quiz_id: self.quiz.quiz_id.clone(),
            step: index,
            total_steps: self.total_steps(),
            answer: answer.to_string(),
        }])
    }

    /// Apply the queued transition.
    pub fn advance(&mut self) -> Result<Vec<FunnelEvent>, FunnelError> {
        let next = self.pending.take().ok_or(FunnelError::NoPendingTransition)?;
        self.step = next;

        match next {
            Step::Question(index) => {
                self.selected = self.answers.get(index).map(str::to_string);
                Ok(Vec::new())
            }
            Step::Form => {
                self.selected = None;
                if self.completion_reported {
                    return Ok(Vec::new());
                }
                self.completion_reported = true;
                Ok(vec![
                    FunnelEvent::FormViewed {
                        quiz_id: self.quiz.quiz_id.clone(),
                    },
                    FunnelEvent::QuizCompleted {
                        quiz_id: self.quiz.quiz_id.clone(),
                        language: self.quiz.language,
                    },
                ])
            }
            Step::Submitted => Ok(Vec::new()),
        }
    }

    pub fn update_form<F>(&mut self, edit: F) -> Result<(), FunnelError>
    where
        F: FnOnce(&mut ContactForm),
    {
        if self.step != Step::Form {
            return Err(FunnelError::NotAtForm);
        }
        edit(&mut self.form);
        Ok(())
    }

    /// Whether the submit action is enabled.
    pub fn can_submit(&self) -> bool {
        self.step == Step::Form && !self.submitting && self.form.is_complete()
    }

    /// Build the lead and mark a submission as in flight.
    pub fn begin_submission(&mut self, utm: &UtmParams) -> Result<LeadSubmission, FunnelError> {
        if self.step != Step::Form {
            return Err(FunnelError::NotAtForm);
        }
        if self.submitting {
            return Err(FunnelError::SubmissionInProgress);
        }

        let lead = LeadSubmission::build(&self.quiz, &self.answers, &self.form, utm)?;
        self.submitting = true;
        Ok(lead)
    }

    /// Settle the in-flight submission. A failure keeps the form as typed.
    pub fn finish_submission(&mut self, accepted: bool) -> Vec<FunnelEvent> {
        self.submitting = false;
        if !accepted {
            return Vec::new();
        }

        self.step = Step::Submitted;
        vec![FunnelEvent::FormSubmitted {
            quiz_id: self.quiz.quiz_id.clone(),
            language: self.quiz.language,
        }]
    }

    /// Event for leaving before the form; None once the form was reached.
    pub fn drop_off_event(&self) -> Option<FunnelEvent> {
        match self.step {
            Step::Question(index) => Some(FunnelEvent::DroppedOff {
                quiz_id: self.quiz.quiz_id.clone(),
                step: index,
                total_steps: self.total_steps(),
            }),
            Step::Form | Step::Submitted => None,
        }
    }
}

/// Collaborators a running quiz needs.
#[derive(Clone)]
pub struct FlowServices {
    pub analytics: Analytics,
    pub backend: Arc<dyn FunnelBackend>,
    pub experiments: Arc<ExperimentService>,
    pub settings: FlowSettings,
}

/// A quiz being played by one visitor.
///
/// Answer selection schedules the next step on a Tokio timer. The timer is
/// aborted when the answer is changed or the flow is dropped.
pub struct QuizFlow {
    machine: Arc<Mutex<QuizMachine>>,
    pending: Option<JoinHandle<()>>,
    session_id: String,
    utm: UtmParams,
    assignment: Option<Assignment>,
    services: FlowServices,
}

impl QuizFlow {
    /// Start the quiz and emit `QuizStarted`.
    pub fn start(
        quiz: ResolvedQuiz,
        session_id: String,
        utm: UtmParams,
        assignment: Option<Assignment>,
        services: FlowServices,
    ) -> Self {
        info!(
            "Quiz '{}' started ({}, {} steps) for {}",
            quiz.quiz_id,
            quiz.language,
            quiz.total_steps(),
            session_id
        );
        services.analytics.emit(
            &session_id,
            FunnelEvent::QuizStarted {
                quiz_id: quiz.quiz_id.clone(),
                language: quiz.language,
            },
        );

        Self {
            machine: Arc::new(Mutex::new(QuizMachine::new(quiz))),
            pending: None,
            session_id,
            utm,
            assignment,
            services,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn utm(&self) -> &UtmParams {
        &self.utm
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    /// Copy of the current state for rendering.
    pub async fn snapshot(&self) -> QuizMachine {
        self.machine.lock().await.clone()
    }

    pub async fn step(&self) -> Step {
        self.machine.lock().await.step()
    }

    /// Record an answer, emit the step event, then schedule the advance.
    ///
    /// A rejected answer leaves any scheduled advance in place.
    pub async fn select_answer(&mut self, answer: &str) -> Result<(), FunnelError> {
        let events = self.machine.lock().await.select_answer(answer)?;
        self.cancel_pending();

        for event in events {
            self.services.analytics.emit(&self.session_id, event);
        }

        let machine = Arc::clone(&self.machine);
        let analytics = self.services.analytics.clone();
        let session_id = self.session_id.clone();
        let delay = self.services.settings.auto_advance_delay();

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let advanced = machine.lock().await.advance();
            match advanced {
                Ok(events) => {
                    for event in events {
                        analytics.emit(&session_id, event);
                    }
                }
                Err(e) => debug!("Scheduled advance skipped: {}", e),
            }
        }));

        Ok(())
    }

    /// Wait for the scheduled advance to happen.
    pub async fn wait_for_advance(&mut self) -> Result<(), FunnelError> {
        let handle = self.pending.take().ok_or(FunnelError::NoPendingTransition)?;
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                warn!("Scheduled advance failed: {}", e);
            }
        }
        Ok(())
    }

    pub async fn update_form<F>(&self, edit: F) -> Result<(), FunnelError>
    where
        F: FnOnce(&mut ContactForm),
    {
        self.machine.lock().await.update_form(edit)
    }

    pub async fn can_submit(&self) -> bool {
        self.machine.lock().await.can_submit()
    }

    /// Send the lead. Backend failures come back as `SubmitOutcome::Failed`;
    /// `Err` means the submission was not attempted.
    pub async fn submit(&self) -> Result<SubmitOutcome, FunnelError> {
        let lead = self.machine.lock().await.begin_submission(&self.utm)?;
        let quiz_id = lead.quiz_name.clone();

        let result = self.services.backend.submit_lead(&lead).await;
        record_lead_submission(result.is_ok());

        let mut machine = self.machine.lock().await;
        match result {
            Ok(()) => {
                let events = machine.finish_submission(true);
                drop(machine);

                info!("Lead submitted for quiz '{}'", quiz_id);
                self.services
                    .experiments
                    .report_conversion(&self.session_id, &quiz_id);
                for event in events {
                    self.services.analytics.emit(&self.session_id, event);
                }

                Ok(SubmitOutcome::Submitted {
                    notice: SUBMIT_SUCCESS_NOTICE.to_string(),
                    redirect_to: self.services.settings.thank_you_path.clone(),
                    redirect_after: self.services.settings.redirect_delay(),
                })
            }
            Err(e) => {
                machine.finish_submission(false);
                warn!("Lead submission for quiz '{}' failed: {}", quiz_id, e);
                Ok(SubmitOutcome::Failed {
                    message: e
                        .server_message()
                        .unwrap_or(SUBMIT_FAILED_FALLBACK)
                        .to_string(),
                })
            }
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for QuizFlow {
    fn drop(&mut self) {
        self.cancel_pending();

        let Ok(machine) = self.machine.try_lock() else {
            debug!("Quiz state busy during teardown, skipping drop-off event");
            return;
        };
        if let Some(event) = machine.drop_off_event() {
            debug!("Visitor left quiz '{}' early", event.quiz_id());
            self.services.analytics.emit(&self.session_id, event);
        }
    }
}
