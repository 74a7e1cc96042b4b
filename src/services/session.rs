/// Run Session
/// State machine behind the one-shot command modal:
/// Idle -> (AwaitingSecret ->) Running -> Succeeded | Failed -> (close) -> Idle.
///
/// The session never calls the backend itself. `begin` and `submit_secret`
/// hand back an `Invocation` for the owner to dispatch once it has released
/// whatever lock guards the session.

use super::ansi;
use super::sentinel::{self, Completion, Payload};
use crate::error::{Result, ShellError};
use crate::models::{CommandId, InvokeArgs, Markup, ModalView, RunRequest, RunStatus, Secret};

/// Backend boundary: start a command by name. Fire-and-forget; output comes
/// back over the command's channel.
pub trait Invoker: Send + Sync {
    fn invoke(&self, command: &CommandId, args: InvokeArgs) -> Result<()>;
}

/// A pending backend call produced by a state transition.
#[derive(Debug)]
pub struct Invocation {
    pub command: CommandId,
    pub args: InvokeArgs,
}

impl Invocation {
    /// Call the backend. The arguments (and any secret in them) are dropped,
    /// and so wiped, when this returns.
    pub fn dispatch(self, invoker: &dyn Invoker) {
        let Invocation { command, args } = self;
        // An invocation error is not surfaced; the run just never completes.
        if let Err(e) = invoker.invoke(&command, args) {
            log::error!("[Run] failed to invoke {}: {}", command, e);
        }
    }
}

#[derive(Debug)]
pub enum Begin {
    Invoke(Invocation),
    PromptSecret,
    /// Already started, or the secret prompt is already open.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    Appended,
    Finished(Completion),
    Discarded,
}

/// Modal headline text per state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headlines {
    pub title: String,
    pub done: Option<String>,
    pub failed: Option<String>,
}

impl Headlines {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            done: None,
            failed: None,
        }
    }
}

pub struct RunSession {
    request: RunRequest,
    headlines: Headlines,
    status: RunStatus,
    output: Vec<String>,
    markup: Markup,
    completion: Option<Completion>,
    has_started: bool,
    secret_prompted: bool,
}

impl RunSession {
    pub fn new(request: RunRequest, headlines: Headlines) -> Self {
        Self {
            request,
            headlines,
            status: RunStatus::Idle,
            output: Vec::new(),
            markup: Markup::default(),
            completion: None,
            has_started: false,
            secret_prompted: false,
        }
    }

    pub fn request(&self) -> &RunRequest {
        &self.request
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn markup(&self) -> &Markup {
        &self.markup
    }

    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    pub fn has_started(&self) -> bool {
        self.has_started
    }

    pub fn secret_prompt_open(&self) -> bool {
        self.secret_prompted
    }

    pub fn begin(&mut self) -> Begin {
        if self.has_started || self.secret_prompted {
            return Begin::Ignored;
        }
        if self.request.requires_secret {
            self.status = RunStatus::AwaitingSecret;
            self.secret_prompted = true;
            return Begin::PromptSecret;
        }
        Begin::Invoke(self.start(InvokeArgs::default()))
    }

    /// Start the run with the user's secret. The caller's `secret` is left
    /// empty whether or not the submission is accepted.
    pub fn submit_secret(&mut self, secret: &mut Secret) -> Result<Invocation> {
        if self.status != RunStatus::AwaitingSecret {
            secret.wipe();
            return Err(ShellError::InvalidTransition {
                from: self.status,
                action: "submit a secret",
            });
        }
        self.secret_prompted = false;
        Ok(self.start(InvokeArgs::with_password(std::mem::take(secret))))
    }

    /// The user dismissed the secret prompt without submitting.
    pub fn cancel_secret(&mut self) -> Result<()> {
        if self.status != RunStatus::AwaitingSecret {
            return Err(ShellError::InvalidTransition {
                from: self.status,
                action: "cancel the secret prompt",
            });
        }
        self.status = RunStatus::Idle;
        self.secret_prompted = false;
        Ok(())
    }

    fn start(&mut self, args: InvokeArgs) -> Invocation {
        self.has_started = true;
        self.status = RunStatus::Running;
        log::info!("[Run] starting {}", self.request.command);
        Invocation {
            command: self.request.command.clone(),
            args,
        }
    }

    /// Feed one payload from the command's channel.
    pub fn accept(&mut self, payload: &str) -> Accepted {
        match sentinel::classify(payload) {
            Payload::Content(line) => match self.status {
                RunStatus::Idle | RunStatus::AwaitingSecret => {
                    log::debug!("[Run] {} not running, dropping line", self.request.command);
                    Accepted::Discarded
                }
                RunStatus::Running | RunStatus::Succeeded | RunStatus::Failed => {
                    self.output.push(line.to_string());
                    self.rerender();
                    Accepted::Appended
                }
            },
            Payload::Completion(done) => {
                if self.status != RunStatus::Running {
                    log::warn!(
                        "[Run] completion for {} while {:?}, ignored",
                        self.request.command,
                        self.status
                    );
                    return Accepted::Discarded;
                }
                self.status = if done.succeeded() {
                    RunStatus::Succeeded
                } else {
                    RunStatus::Failed
                };
                log::info!(
                    "[Run] {} finished with exit code {}",
                    self.request.command,
                    done.raw_code()
                );
                self.completion = Some(done.clone());
                Accepted::Finished(done)
            }
        }
    }

    // Full re-render of the whole buffer on each line.
    fn rerender(&mut self) {
        let mut body = String::new();
        for line in &self.output {
            body.push_str(line);
            body.push('\n');
        }
        let body = body.strip_prefix('\n').unwrap_or(&body);
        self.markup = ansi::render(body);
    }

    /// Leave a finished run and make the session reusable.
    pub fn close(&mut self) -> Result<()> {
        if !self.status.is_terminal() {
            return Err(ShellError::InvalidTransition {
                from: self.status,
                action: "close",
            });
        }
        self.output.clear();
        self.markup = Markup::default();
        self.completion = None;
        self.status = RunStatus::Idle;
        self.has_started = false;
        self.secret_prompted = false;
        Ok(())
    }

    pub fn closable(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn headline(&self) -> &str {
        match self.status {
            RunStatus::Succeeded => self.headlines.done.as_deref().unwrap_or("Done"),
            RunStatus::Failed => self.headlines.failed.as_deref().unwrap_or("Failed"),
            _ => &self.headlines.title,
        }
    }

    pub fn view(&self) -> ModalView {
        ModalView {
            command: self.request.command.clone(),
            status: self.status,
            headline: self.headline().to_string(),
            markup: self.markup.clone(),
            closable: self.closable(),
            secret_prompt: self.secret_prompted,
            exit_code: self.completion.as_ref().map(|c| c.raw_code().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Channel;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingInvoker {
        calls: Mutex<Vec<(CommandId, Option<String>)>>,
    }

    impl Invoker for RecordingInvoker {
        fn invoke(&self, command: &CommandId, args: InvokeArgs) -> Result<()> {
            let password = args.password.as_ref().map(|s| s.expose().to_string());
            self.calls.lock().push((command.clone(), password));
            Ok(())
        }
    }

    fn session() -> RunSession {
        RunSession::new(
            RunRequest::new("install_sdk", Channel::CommandOutput),
            Headlines::titled("Installing SDK"),
        )
    }

    fn secret_session() -> RunSession {
        RunSession::new(
            RunRequest::new("install_sdk", Channel::CommandOutput).with_secret(),
            Headlines::titled("Installing SDK"),
        )
    }

    fn run(session: &mut RunSession, invoker: &RecordingInvoker) {
        match session.begin() {
            Begin::Invoke(invocation) => invocation.dispatch(invoker),
            other => panic!("expected invocation, got {:?}", other),
        }
    }

    #[test]
    fn begin_invokes_and_runs() {
        let invoker = RecordingInvoker::default();
        let mut s = session();
        assert_eq!(s.status(), RunStatus::Idle);

        run(&mut s, &invoker);
        assert_eq!(s.status(), RunStatus::Running);
        assert_eq!(s.headline(), "Installing SDK");
        assert_eq!(
            *invoker.calls.lock(),
            vec![(CommandId::new("install_sdk"), None)]
        );
    }

    #[test]
    fn second_begin_is_ignored() {
        let invoker = RecordingInvoker::default();
        let mut s = session();
        run(&mut s, &invoker);

        assert!(matches!(s.begin(), Begin::Ignored));
        assert!(matches!(s.begin(), Begin::Ignored));
        assert_eq!(invoker.calls.lock().len(), 1);
    }

    #[test]
    fn lines_accumulate_in_order_and_render() {
        let invoker = RecordingInvoker::default();
        let mut s = session();
        run(&mut s, &invoker);

        for line in ["fetching", "", "\x1b[32mok\x1b[0m <done>"] {
            assert_eq!(s.accept(line), Accepted::Appended);
        }
        assert_eq!(s.output(), ["fetching", "", "\x1b[32mok\x1b[0m <done>"]);
        assert_eq!(
            s.markup().as_str(),
            "fetching\n\n<span style=\"color:#0A0\">ok</span> &lt;done&gt;\n"
        );
    }

    #[test]
    fn leading_newline_is_stripped_at_render_only() {
        let invoker = RecordingInvoker::default();
        let mut s = session();
        run(&mut s, &invoker);

        s.accept("");
        s.accept("first");
        assert_eq!(s.output(), ["", "first"]);
        assert_eq!(s.markup().as_str(), "first\n");
    }

    #[test]
    fn zero_exit_succeeds() {
        let invoker = RecordingInvoker::default();
        let mut s = session();
        run(&mut s, &invoker);
        s.accept("working");

        let accepted = s.accept("foo.command.done.0");
        assert!(matches!(accepted, Accepted::Finished(ref c) if c.succeeded()));
        assert_eq!(s.status(), RunStatus::Succeeded);
        assert_eq!(s.headline(), "Done");
        assert!(s.closable());
        assert_eq!(s.output(), ["working"]);
        assert_eq!(s.view().exit_code.as_deref(), Some("0"));
    }

    #[test]
    fn nonzero_and_malformed_exit_fail() {
        let invoker = RecordingInvoker::default();

        let mut s = session();
        run(&mut s, &invoker);
        s.accept("foo.command.done.7");
        assert_eq!(s.status(), RunStatus::Failed);
        assert_eq!(s.completion().and_then(|c| c.exit_code()), Some(7));
        assert_eq!(s.headline(), "Failed");

        let mut s = session();
        run(&mut s, &invoker);
        s.accept("foo.command.done.x");
        assert_eq!(s.status(), RunStatus::Failed);
    }

    #[test]
    fn custom_headlines() {
        let invoker = RecordingInvoker::default();
        let mut s = RunSession::new(
            RunRequest::new("install_sdk", Channel::CommandOutput),
            Headlines {
                title: "Installing".into(),
                done: Some("Installed".into()),
                failed: Some("Install failed".into()),
            },
        );
        run(&mut s, &invoker);
        s.accept("command.done.1");
        assert_eq!(s.headline(), "Install failed");
    }

    #[test]
    fn secret_required_before_invocation() {
        let invoker = RecordingInvoker::default();
        let mut s = secret_session();

        assert!(matches!(s.begin(), Begin::PromptSecret));
        assert_eq!(s.status(), RunStatus::AwaitingSecret);
        assert!(s.secret_prompt_open());
        assert!(matches!(s.begin(), Begin::Ignored));
        assert!(invoker.calls.lock().is_empty());

        let mut secret = Secret::new("hunter2");
        let invocation = s.submit_secret(&mut secret).unwrap();
        assert!(secret.is_empty());
        assert_eq!(s.status(), RunStatus::Running);
        assert!(!s.secret_prompt_open());
        invocation.dispatch(&invoker);

        assert_eq!(
            *invoker.calls.lock(),
            vec![(CommandId::new("install_sdk"), Some("hunter2".to_string()))]
        );
        assert!(matches!(s.begin(), Begin::Ignored));
    }

    #[test]
    fn secret_rejected_outside_prompt() {
        let mut s = session();
        let mut secret = Secret::new("hunter2");
        let err = s.submit_secret(&mut secret);
        assert!(matches!(err, Err(ShellError::InvalidTransition { .. })));
        assert!(secret.is_empty());
        assert_eq!(secret.expose(), "");
    }

    #[test]
    fn session_keeps_no_copy_of_the_secret() {
        let invoker = RecordingInvoker::default();
        let mut s = secret_session();
        s.begin();
        let mut secret = Secret::new("pw-7731");
        s.submit_secret(&mut secret).unwrap().dispatch(&invoker);

        assert!(secret.is_empty());
        assert_eq!(invoker.calls.lock()[0].1.as_deref(), Some("pw-7731"));
        let view = serde_json::to_string(&s.view()).unwrap();
        assert!(!view.contains("pw-7731"));
    }

    #[test]
    fn cancelled_prompt_can_be_reopened() {
        let mut s = secret_session();
        assert!(matches!(s.begin(), Begin::PromptSecret));
        s.cancel_secret().unwrap();
        assert_eq!(s.status(), RunStatus::Idle);
        assert!(matches!(s.begin(), Begin::PromptSecret));
    }

    #[test]
    fn close_resets_for_a_full_rerun() {
        let invoker = RecordingInvoker::default();
        let mut s = session();
        run(&mut s, &invoker);
        s.accept("first run");
        s.accept("command.done.0");

        s.close().unwrap();
        assert_eq!(s.status(), RunStatus::Idle);
        assert!(s.output().is_empty());
        assert!(s.markup().is_empty());
        assert!(s.completion().is_none());
        assert!(!s.has_started());

        run(&mut s, &invoker);
        assert_eq!(invoker.calls.lock().len(), 2);
        s.accept("second run");
        assert_eq!(s.output(), ["second run"]);
    }

    #[test]
    fn close_resets_secret_prompt_guard() {
        let invoker = RecordingInvoker::default();
        let mut s = secret_session();
        s.begin();
        s.submit_secret(&mut Secret::new("pw")).unwrap().dispatch(&invoker);
        s.accept("command.done.2");
        s.close().unwrap();

        assert!(matches!(s.begin(), Begin::PromptSecret));
    }

    #[test]
    fn close_only_from_terminal_states() {
        let invoker = RecordingInvoker::default();
        let mut s = session();
        assert!(s.close().is_err());
        run(&mut s, &invoker);
        assert!(s.close().is_err());
        assert!(!s.closable());
    }

    #[test]
    fn lines_outside_a_run_are_dropped() {
        let mut s = session();
        assert_eq!(s.accept("stray"), Accepted::Discarded);
        assert_eq!(s.accept("command.done.0"), Accepted::Discarded);
        assert_eq!(s.status(), RunStatus::Idle);
        assert!(s.output().is_empty());
    }

    #[test]
    fn late_lines_after_completion_are_kept() {
        let invoker = RecordingInvoker::default();
        let mut s = session();
        run(&mut s, &invoker);
        s.accept("command.done.0");
        assert_eq!(s.accept("trailing"), Accepted::Appended);
        assert_eq!(s.accept("command.done.1"), Accepted::Discarded);
        assert_eq!(s.status(), RunStatus::Succeeded);
        assert_eq!(s.output(), ["trailing"]);
    }
}
