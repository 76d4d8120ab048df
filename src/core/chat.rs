use std::future::Future;
use std::io::Write;

use crate::core::{ChatError, Config, Level, Logger, API_KEY_VARS};
use crate::providers::{ChatClient, Connector, Message, Role, NO_RESPONSE};
use colored::Colorize;
use futures::StreamExt;
use log::debug;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Lifecycle of a chat session.
///
/// `Idle -> Running -> (Sending -> Waiting -> Printing -> Running)* -> Stopping -> Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Sending,
    Waiting,
    Printing,
    Stopping,
    Terminated,
}

/// Why a chat session ended.
#[derive(Debug)]
pub enum Termination {
    /// The user typed an exit keyword
    UserExit,
    /// Input was closed (Ctrl-D or a drained pipe)
    EndOfInput,
    /// The configured number of turns was used up
    TurnLimit,
    /// Ctrl-C or another shutdown signal
    Interrupted,
    Unrecoverable(ChatError),
}

impl Termination {
    pub const fn is_graceful(&self) -> bool {
        matches!(self, Self::UserExit | Self::EndOfInput | Self::TurnLimit)
    }

    /// Process exit code for this outcome.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::UserExit | Self::EndOfInput | Self::TurnLimit => 0,
            Self::Unrecoverable(_) => 1,
            Self::Interrupted => 130,
        }
    }

    const fn summary(&self) -> &'static str {
        match self {
            Self::UserExit | Self::EndOfInput | Self::TurnLimit => "Chat ended successfully.",
            Self::Interrupted => "Chat interrupted, session closed.",
            Self::Unrecoverable(_) => "Chat closed after an unrecoverable error.",
        }
    }
}

/// What the loop does after handling one line of input.
#[derive(Debug)]
pub enum Flow {
    Continue,
    Stop(Termination),
}

/// Drives one interactive conversation against a [`ChatClient`].
///
/// The loop owns the client handle and the in-memory history for the
/// lifetime of the session. Nothing is written to disk.
pub struct ChatLoop<'a> {
    client: Option<Box<dyn ChatClient>>,
    config: Config,
    history: Vec<Message>,
    logger: &'a Logger,
    state: SessionState,
    turns: u32,
}

impl<'a> ChatLoop<'a> {
    /// Opens a session for the API key held in `config`.
    ///
    /// # Errors
    /// Returns [`ChatError::Configuration`] when no key is configured, before
    /// the connector is asked for a client.
    pub fn start(
        config: Config,
        connector: &dyn Connector,
        logger: &'a Logger,
    ) -> Result<Self, ChatError> {
        let api_key = config.api_key.as_ref().ok_or_else(|| {
            ChatError::Configuration(format!(
                "No API key found, set {} or {}",
                API_KEY_VARS[0], API_KEY_VARS[1]
            ))
        })?;
        let client = connector.connect(api_key, &config)?;

        let mut chat = Self {
            client: Some(client),
            config,
            history: Vec::new(),
            logger,
            state: SessionState::Idle,
            turns: 0,
        };
        Self::transition(&mut chat.state, SessionState::Running);
        logger.info(format!(
            "Chat session started with model {}",
            chat.config.model()
        ));
        Ok(chat)
    }

    /// Runs turns until the user quits, input ends, the turn limit is hit,
    /// `shutdown` completes or an unrecoverable error occurs. The session is
    /// always stopped before this returns.
    pub async fn run<R, W, F>(&mut self, input: &mut R, output: &mut W, shutdown: F) -> Termination
    where
        R: AsyncBufRead + Unpin,
        W: Write,
        F: Future<Output = ()>,
    {
        if self.state == SessionState::Terminated {
            return Termination::Unrecoverable(ChatError::Unrecoverable(
                "chat session is already closed".to_string(),
            ));
        }

        let termination = match self.welcome(output) {
            Ok(()) => self.drive(input, output, shutdown).await,
            Err(error) => self.fail(error),
        };
        self.stop(&termination);
        termination
    }

    async fn drive<R, W, F>(&mut self, input: &mut R, output: &mut W, shutdown: F) -> Termination
    where
        R: AsyncBufRead + Unpin,
        W: Write,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let flow = tokio::select! {
                biased;
                () = &mut shutdown => Flow::Stop(Termination::Interrupted),
                flow = self.turn(input, output) => flow,
            };
            if let Flow::Stop(termination) = flow {
                if matches!(termination, Termination::Interrupted) {
                    self.withdraw_unanswered();
                }
                return termination;
            }
        }
    }

    async fn turn<R, W>(&mut self, input: &mut R, output: &mut W) -> Flow
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        match self.read_input(input, output).await {
            Ok(Some(text)) => self.dispatch(&text, output).await,
            Ok(None) => Flow::Stop(Termination::EndOfInput),
            Err(error) => Flow::Stop(self.fail(error)),
        }
    }

    /// A turn cut off mid-request leaves its prompt without a reply.
    fn withdraw_unanswered(&mut self) {
        if self.history.last().is_some_and(|m| m.role == Role::User) {
            debug!("[Chat] dropping unanswered prompt");
            self.history.pop();
        }
    }

    /// Prompts for and reads one line, trimmed. `None` means input is closed.
    /// Bytes that are not valid UTF-8 are replaced rather than rejected.
    pub async fn read_input<R, W>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<Option<String>, ChatError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        write!(output, "\n{} ", "You:".bold().green())?;
        output.flush()?;

        let mut line = Vec::new();
        if input.read_until(b'\n', &mut line).await? == 0 {
            writeln!(output)?;
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&line).trim().to_string()))
    }

    /// Handles one line of user input.
    pub async fn dispatch<W: Write>(&mut self, text: &str, output: &mut W) -> Flow {
        if text.is_empty() {
            return Flow::Continue;
        }
        if self.config.is_exit_keyword(text) {
            debug!("[Chat] exit keyword received");
            return Flow::Stop(Termination::UserExit);
        }

        self.history.push(Message::user(text));
        let result = self.exchange(output).await;
        Self::transition(&mut self.state, SessionState::Running);

        match result {
            Ok(reply) => {
                self.history.push(Message::model(reply));
                self.turns += 1;
                if self.turns < self.config.max_turns {
                    return Flow::Continue;
                }
                match writeln!(
                    output,
                    "\nReached the limit of {} questions. Exiting chat.",
                    self.config.max_turns
                ) {
                    Ok(()) => Flow::Stop(Termination::TurnLimit),
                    Err(e) => Flow::Stop(self.fail(e.into())),
                }
            }
            Err(error) => {
                // Keep the history alternating user/model.
                self.history.pop();
                if error.is_unrecoverable() {
                    return Flow::Stop(self.fail(error));
                }
                self.logger.report(Level::Error, &error);
                Flow::Continue
            }
        }
    }

    /// Sends the latest prompt with its context and prints the reply.
    async fn exchange<W: Write>(&mut self, output: &mut W) -> Result<String, ChatError> {
        let client = self
            .client
            .as_deref()
            .ok_or_else(|| ChatError::Unrecoverable("chat session is closed".to_string()))?;
        let window = self.config.context_window as usize * 2 + 1;
        let context = &self.history[self.history.len().saturating_sub(window)..];
        let label = "Gemini:".bold().blue();

        Self::transition(&mut self.state, SessionState::Sending);
        if !self.config.stream {
            Self::transition(&mut self.state, SessionState::Waiting);
            let mut reply = client.send(context).await?;
            if reply.trim().is_empty() {
                reply = NO_RESPONSE.to_string();
            }
            Self::transition(&mut self.state, SessionState::Printing);
            writeln!(output, "{label} {reply}")?;
            return Ok(reply);
        }

        let mut stream = client.send_streaming(context).await?;
        Self::transition(&mut self.state, SessionState::Waiting);

        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    if !reply.is_empty() {
                        writeln!(output)?;
                    }
                    return Err(error);
                }
            };
            if chunk.is_empty() {
                continue;
            }
            if reply.is_empty() {
                Self::transition(&mut self.state, SessionState::Printing);
                write!(output, "{label} ")?;
            }
            write!(output, "{chunk}")?;
            output.flush()?;
            reply.push_str(&chunk);
        }

        if reply.trim().is_empty() {
            if reply.is_empty() {
                Self::transition(&mut self.state, SessionState::Printing);
                write!(output, "{label} ")?;
            }
            write!(output, "{NO_RESPONSE}")?;
            reply = NO_RESPONSE.to_string();
        }
        writeln!(output)?;
        Ok(reply)
    }

    /// Releases the client and logs how the session ended. Only the first
    /// call has any effect.
    pub fn stop(&mut self, termination: &Termination) {
        if self.state == SessionState::Terminated {
            return;
        }
        Self::transition(&mut self.state, SessionState::Stopping);
        self.client = None;
        Self::transition(&mut self.state, SessionState::Terminated);
        self.logger.info(termination.summary());
    }

    fn welcome<W: Write>(&self, output: &mut W) -> Result<(), ChatError> {
        writeln!(output, "Welcome to [{}] chat!", self.config.model())?;
        if !self.config.exit_keywords.is_empty() {
            writeln!(
                output,
                "Type '{}' to end the chat.",
                self.config.exit_keywords.join("' or '")
            )?;
        }
        Ok(())
    }

    fn fail(&self, error: ChatError) -> Termination {
        self.logger.report(Level::Critical, &error);
        Termination::Unrecoverable(error)
    }

    fn transition(state: &mut SessionState, next: SessionState) {
        debug!("[Chat] {state:?} -> {next:?}");
        *state = next;
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub const fn turns(&self) -> u32 {
        self.turns
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }
}
