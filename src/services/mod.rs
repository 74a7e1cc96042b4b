/// Services module
/// The command-streaming core: channel transport, sentinel protocol, ANSI
/// rendering, the modal run session, the build console, the PTY runner and
/// the registry of mounted views.

pub mod ansi;
pub mod channel;
pub mod console;
pub mod modal;
pub mod runner;
pub mod sentinel;
pub mod session;
pub mod views;

pub use channel::{EventBus, ListenerId, LocalBus, Subscription};
pub use console::{BuildConsole, ConsoleBuffer, Viewport};
pub use modal::{ModalRunner, Presenter};
pub use runner::{CommandRunner, CommandSpec};
pub use session::{Headlines, Invoker, RunSession};
pub use views::Views;
