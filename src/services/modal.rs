/// Modal Runner
/// Owns one `RunSession`, its channel subscription and the presenter that
/// displays it. The subscription is taken on mount and released on drop, so a
/// runner never listens twice and never outlives its view.

use super::channel::{EventBus, Subscription};
use super::session::{Accepted, Begin, Headlines, Invoker, RunSession};
use crate::error::Result;
use crate::models::{CommandId, Frame, ModalView, RunRequest, Secret};
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives display frames. Frames arrive in the order they must be applied.
pub trait Presenter: Send + Sync {
    fn present(&self, frame: Frame);
}

pub struct ModalRunner {
    command: CommandId,
    session: Arc<Mutex<RunSession>>,
    invoker: Arc<dyn Invoker>,
    presenter: Arc<dyn Presenter>,
    subscription: Subscription,
}

impl ModalRunner {
    pub fn mount(
        bus: Arc<dyn EventBus>,
        invoker: Arc<dyn Invoker>,
        presenter: Arc<dyn Presenter>,
        request: RunRequest,
        headlines: Headlines,
    ) -> Self {
        let command = request.command.clone();
        let channel = request.channel;
        let session = Arc::new(Mutex::new(RunSession::new(request, headlines)));

        let subscription = {
            let session = session.clone();
            let presenter = presenter.clone();
            let command = command.clone();
            Subscription::acquire(bus, channel, move |line| {
                let view = {
                    let mut session = session.lock();
                    if session.accept(line) == Accepted::Discarded {
                        return;
                    }
                    session.view()
                };
                presenter.present(Frame::Modal(view));
                // Scroll only after the new content has been presented.
                presenter.present(Frame::ScrollToLatest {
                    command: command.clone(),
                });
            })
        };

        log::debug!("[Modal] mounted {} on {}", command, channel);
        Self {
            command,
            session,
            invoker,
            presenter,
            subscription,
        }
    }

    pub fn command(&self) -> &CommandId {
        &self.command
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_active()
    }

    /// Start the command, or open the secret prompt if one is required.
    /// Repeated calls during a run do nothing.
    pub fn begin(&self) {
        let (begin, view) = {
            let mut session = self.session.lock();
            let begin = session.begin();
            (begin, session.view())
        };
        match begin {
            Begin::Ignored => {}
            Begin::PromptSecret => self.presenter.present(Frame::Modal(view)),
            Begin::Invoke(invocation) => {
                self.presenter.present(Frame::Modal(view));
                invocation.dispatch(self.invoker.as_ref());
            }
        }
    }

    pub fn submit_secret(&self, mut secret: Secret) -> Result<()> {
        let (invocation, view) = {
            let mut session = self.session.lock();
            let invocation = session.submit_secret(&mut secret)?;
            (invocation, session.view())
        };
        self.presenter.present(Frame::Modal(view));
        invocation.dispatch(self.invoker.as_ref());
        Ok(())
    }

    pub fn cancel_secret(&self) -> Result<()> {
        let view = {
            let mut session = self.session.lock();
            session.cancel_secret()?;
            session.view()
        };
        self.presenter.present(Frame::Modal(view));
        Ok(())
    }

    /// Dismiss a finished run; the runner is then ready for another `begin`.
    pub fn close(&self) -> Result<()> {
        let view = {
            let mut session = self.session.lock();
            session.close()?;
            session.view()
        };
        self.presenter.present(Frame::Modal(view));
        Ok(())
    }

    pub fn view(&self) -> ModalView {
        self.session.lock().view()
    }

    pub fn output(&self) -> Vec<String> {
        self.session.lock().output().to_vec()
    }
}
