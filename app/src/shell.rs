use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use qdesk_adapters::export::{cell_text, export_statement, ExportError, ExportFormat};
use qdesk_core::auth::{Credentials, NewAccount};
use qdesk_core::connection_manager::{ConnectionDescriptor, DatabaseKind};
use qdesk_core::query_library::NewSavedQuery;
use qdesk_core::query_runner::{ExecutionOutcome, StatementResult};
use qdesk_core::session::{ConnectReport, Session, SessionBackend, SessionError};
use serde_json::Value;
use thiserror::Error;

const PROMPT: &str = "qdesk> ";
const MAX_RENDERED_ROWS: usize = 200;
const PERF_LINES: usize = 10;

const HELP: &str = "\
SQL lines are sent as-is to the active connection.
Arguments containing spaces can be quoted: password=\"my secret\".
  \\connect <sqlite|mysql|postgresql> <database> [host=..] [port=..] [user=..] [password=..]
  \\sample                 load and connect to the sample database
  \\disconnect
  \\status
  \\tables
  \\schema [table]         list tables, or the columns of one table
  \\refresh                reload the schema
  \\er                     tables, columns and relations
  \\explain <sql>          show the execution plan
  \\indexes <sql>          index recommendations
  \\suggest <prompt>       generate SQL from a description
  \\autoexplain on|off
  \\history               server-side run history
  \\perf                  recent local timings
  \\save [--public] <title>  save the last executed query
  \\saved
  \\databases
  \\createdb <name>        create a database on the connected server
  \\export <path> [csv|json]
  \\login <user> <password>
  \\register <user> <password> [email]
  \\logout
  \\help
  \\quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Help,
    Connect(ConnectionDescriptor),
    Sample,
    Disconnect,
    Status,
    Tables,
    Schema(Option<String>),
    Refresh,
    ErDiagram,
    Explain(String),
    Indexes(String),
    Suggest(String),
    AutoExplain(bool),
    History,
    Perf,
    Save { title: String, is_public: bool },
    Saved,
    Databases,
    CreateDatabase(String),
    Export { path: PathBuf, format: ExportFormat },
    Login(Credentials),
    Register(NewAccount),
    Logout,
    Run(String),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown command `\\{0}` (try \\help)")]
    UnknownCommand(String),
    #[error("unclosed quote in arguments")]
    UnclosedQuote,
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Export(#[from] ExportError),
    #[error("nothing to {0} yet: run a query first")]
    NoPreviousQuery(&'static str),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub fn parse_command(line: &str) -> Result<Command, ShellError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(rest) = line.strip_prefix('\\') else {
        return Ok(Command::Run(line.to_string()));
    };

    let (name, args) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(name, args)| (name, args.trim()));
    let name = name.to_ascii_lowercase();
    // Free-text commands take the rest of the line verbatim, apostrophes included.
    let owned_words = if matches!(name.as_str(), "explain" | "indexes" | "suggest" | "save") {
        Vec::new()
    } else {
        split_args(args)?
    };
    let words = owned_words.iter().map(String::as_str).collect::<Vec<_>>();

    match name.as_str() {
        "q" | "quit" | "exit" => Ok(Command::Quit),
        "h" | "help" | "?" => Ok(Command::Help),
        "connect" | "c" => parse_connect(&words).map(Command::Connect),
        "sample" => Ok(Command::Sample),
        "disconnect" => Ok(Command::Disconnect),
        "status" => Ok(Command::Status),
        "tables" | "dt" => Ok(Command::Tables),
        "schema" | "d" => Ok(Command::Schema(words.first().map(|table| (*table).to_string()))),
        "refresh" => Ok(Command::Refresh),
        "er" => Ok(Command::ErDiagram),
        "explain" => required_text(args, "\\explain <sql>").map(Command::Explain),
        "indexes" => required_text(args, "\\indexes <sql>").map(Command::Indexes),
        "suggest" => required_text(args, "\\suggest <prompt>").map(Command::Suggest),
        "autoexplain" => match words.as_slice() {
            ["on"] => Ok(Command::AutoExplain(true)),
            ["off"] => Ok(Command::AutoExplain(false)),
            _ => Err(ShellError::Usage("\\autoexplain on|off")),
        },
        "history" => Ok(Command::History),
        "perf" => Ok(Command::Perf),
        "save" => {
            let (is_public, title) = match args.strip_prefix("--public") {
                Some(title) => (true, title.trim()),
                None => (false, args),
            };
            required_text(title, "\\save [--public] <title>").map(|title| Command::Save {
                title,
                is_public,
            })
        }
        "saved" => Ok(Command::Saved),
        "databases" | "l" => Ok(Command::Databases),
        "createdb" => match words.as_slice() {
            [name] => Ok(Command::CreateDatabase((*name).to_string())),
            _ => Err(ShellError::Usage("\\createdb <name>")),
        },
        "export" => match words.as_slice() {
            [path] => {
                let path = PathBuf::from(path);
                let format = ExportFormat::from_path(&path);
                Ok(Command::Export { path, format })
            }
            [path, format] => Ok(Command::Export {
                path: PathBuf::from(path),
                format: format.parse()?,
            }),
            _ => Err(ShellError::Usage("\\export <path> [csv|json]")),
        },
        "login" => match words.as_slice() {
            [username, password] => Ok(Command::Login(Credentials::new(*username, *password))),
            _ => Err(ShellError::Usage("\\login <user> <password>")),
        },
        "register" => match words.as_slice() {
            [username, password, rest @ ..] if rest.len() <= 1 => {
                Ok(Command::Register(NewAccount {
                    username: (*username).to_string(),
                    password: (*password).to_string(),
                    email: rest.first().map(|email| (*email).to_string()),
                }))
            }
            _ => Err(ShellError::Usage("\\register <user> <password> [email]")),
        },
        "logout" => Ok(Command::Logout),
        other => Err(ShellError::UnknownCommand(other.to_string())),
    }
}

/// Splits on whitespace. Single or double quotes group characters, spaces
/// included, into the current word, so `password="a b"` is one word.
fn split_args(args: &str) -> Result<Vec<String>, ShellError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in args.chars() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(ShellError::UnclosedQuote);
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn required_text(args: &str, usage: &'static str) -> Result<String, ShellError> {
    if args.is_empty() {
        Err(ShellError::Usage(usage))
    } else {
        Ok(args.to_string())
    }
}

fn parse_connect(words: &[&str]) -> Result<ConnectionDescriptor, ShellError> {
    const USAGE: &str =
        "\\connect <sqlite|mysql|postgresql> <database> [host=..] [port=..] [user=..] [password=..]";

    let [kind, database, options @ ..] = words else {
        return Err(ShellError::Usage(USAGE));
    };
    let kind = kind
        .parse::<DatabaseKind>()
        .map_err(|_| ShellError::Usage(USAGE))?;

    let mut descriptor = ConnectionDescriptor::sqlite(*database);
    descriptor.kind = kind;
    for option in options {
        let Some((key, value)) = option.split_once('=') else {
            return Err(ShellError::Usage(USAGE));
        };
        let value = Some(value.to_string());
        match key.to_ascii_lowercase().as_str() {
            "host" => descriptor.host = value,
            "port" => descriptor.port = value,
            "user" => descriptor.user = value,
            "password" => descriptor.password = value,
            _ => return Err(ShellError::Usage(USAGE)),
        }
    }
    Ok(descriptor)
}

/// Line-mode front end over one `Session`.
pub struct Shell<B: SessionBackend, W: Write> {
    session: Session<B>,
    out: W,
    last_query: Option<String>,
}

impl<B: SessionBackend, W: Write> Shell<B, W> {
    pub fn new(session: Session<B>, out: W) -> Self {
        Self {
            session,
            out,
            last_query: None,
        }
    }

    /// Reads commands until `\quit` or end of input. Command failures are
    /// printed and the loop goes on; only output errors stop it.
    pub async fn run<R: BufRead>(&mut self, input: R) -> Result<(), ShellError> {
        write!(self.out, "{PROMPT}")?;
        self.out.flush()?;

        for line in input.lines() {
            let line = line?;
            match self.execute_line(&line).await {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(ShellError::Io(error)) => return Err(ShellError::Io(error)),
                Err(error) => {
                    log::debug!("command failed: {error:?}");
                    writeln!(self.out, "error: {error}")?;
                }
            }
            write!(self.out, "{PROMPT}")?;
            self.out.flush()?;
        }

        if self.session.is_connected() {
            self.session.disconnect().await;
        }
        Ok(())
    }

    pub async fn execute_line(&mut self, line: &str) -> Result<Flow, ShellError> {
        let command = parse_command(line)?;
        self.execute(command).await
    }

    pub async fn execute(&mut self, command: Command) -> Result<Flow, ShellError> {
        match command {
            Command::Quit => return Ok(Flow::Quit),
            Command::Empty => {}
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Connect(descriptor) => {
                let report = self.session.connect(descriptor).await?;
                self.print_connect(&report)?;
            }
            Command::Sample => {
                let report = self.session.load_sample_database().await?;
                self.print_connect(&report)?;
            }
            Command::Disconnect => {
                self.session.disconnect().await;
                writeln!(self.out, "Disconnected")?;
            }
            Command::Status => self.print_status()?,
            Command::Tables => {
                for table in self.session.list_tables().await? {
                    writeln!(self.out, "{table}")?;
                }
            }
            Command::Schema(None) => {
                let schema = self.session.schema().await?;
                if schema.tables.is_empty() {
                    writeln!(self.out, "(no tables)")?;
                }
                for table in &schema.tables {
                    writeln!(self.out, "{} ({} columns)", table.name, table.columns.len())?;
                }
            }
            Command::Schema(Some(table)) => {
                let columns = self.session.list_columns(&table).await?;
                if columns.is_empty() {
                    writeln!(self.out, "no columns known for `{table}`")?;
                }
                for column in columns {
                    writeln!(self.out, "  {column}")?;
                }
            }
            Command::Refresh => {
                let schema = self.session.refresh_schema().await?;
                writeln!(self.out, "Schema reloaded: {} tables", schema.tables.len())?;
            }
            Command::ErDiagram => {
                let diagram = self.session.er_diagram().await?;
                for table in &diagram.tables {
                    writeln!(self.out, "{} ({})", table.name, table.columns.join(", "))?;
                    for relation in &table.relations {
                        writeln!(self.out, "    -> {relation}")?;
                    }
                }
                writeln!(
                    self.out,
                    "({} tables, {} relations)",
                    diagram.tables.len(),
                    diagram.relation_count()
                )?;
            }
            Command::Explain(query) => {
                let plan = self.session.explain(&query).await?;
                writeln!(self.out, "{}", pretty(&plan))?;
            }
            Command::Indexes(query) => self.print_recommendations(&query).await?,
            Command::Suggest(prompt) => {
                let suggestion = self.session.suggest(&prompt).await?;
                writeln!(self.out, "{}", suggestion.sql)?;
                if let Some(explanation) = suggestion.explanation {
                    writeln!(self.out, "-- {explanation}")?;
                }
            }
            Command::AutoExplain(enabled) => {
                self.session.set_auto_explain(enabled);
                writeln!(
                    self.out,
                    "Auto-explain {}",
                    if enabled { "enabled" } else { "disabled" }
                )?;
            }
            Command::History => {
                let entries = self.session.history().await?;
                for entry in entries {
                    let timestamp = entry.timestamp.as_deref().unwrap_or("-");
                    let elapsed = entry
                        .execution_time_ms
                        .map_or_else(|| "-".to_string(), |ms| format!("{ms:.1}ms"));
                    writeln!(self.out, "{timestamp}  {elapsed:>10}  {}", entry.query)?;
                }
            }
            Command::Perf => self.print_performance()?,
            Command::Save { title, is_public } => {
                let query = self
                    .last_query
                    .clone()
                    .ok_or(ShellError::NoPreviousQuery("save"))?;
                let id = self
                    .session
                    .save_query(NewSavedQuery {
                        title,
                        query,
                        is_public,
                    })
                    .await?;
                match id {
                    Some(id) => writeln!(self.out, "Query saved (id {id})")?,
                    None => writeln!(self.out, "Query saved")?,
                }
            }
            Command::Saved => {
                for saved in self.session.saved_queries().await? {
                    let id = saved.id.map_or_else(|| "-".to_string(), |id| id.to_string());
                    let visibility = if saved.is_public { "public" } else { "private" };
                    writeln!(self.out, "[{id}] {} ({visibility})", saved.title)?;
                    writeln!(self.out, "    {}", saved.query)?;
                }
            }
            Command::Databases => {
                for database in self.session.databases().await? {
                    writeln!(self.out, "{database}")?;
                }
            }
            Command::CreateDatabase(name) => {
                let message = self.session.create_database(&name).await?;
                writeln!(self.out, "{message}")?;
            }
            Command::Export { path, format } => {
                let statement = self
                    .session
                    .results()
                    .primary_statement()
                    .ok_or(ShellError::NoPreviousQuery("export"))?;
                let written = export_statement(&path, format, statement)?;
                writeln!(self.out, "Exported {written} rows to {}", path.display())?;
            }
            Command::Login(credentials) => {
                let user = self.session.login(&credentials).await?;
                let line = format!("Logged in as {} ({})", user.username, user.role);
                writeln!(self.out, "{line}")?;
            }
            Command::Register(account) => {
                let message = self.session.register(&account).await?;
                writeln!(self.out, "{message}")?;
            }
            Command::Logout => {
                self.session.logout();
                writeln!(self.out, "Logged out")?;
            }
            Command::Run(sql) => self.run_sql(sql).await?,
        }
        Ok(Flow::Continue)
    }

    async fn run_sql(&mut self, sql: String) -> Result<(), ShellError> {
        let report = self.session.run(&sql).await?;
        self.last_query = Some(sql.clone());

        write!(self.out, "{}", render_outcome(&report.outcome))?;
        if report.schema_refreshed {
            writeln!(self.out, "(schema reloaded)")?;
        }
        if report.is_slow() {
            writeln!(
                self.out,
                "Slow query ({:.0}ms). Checking index recommendations...",
                report.outcome.elapsed_ms()
            )?;
            if let Err(error) = self.print_recommendations(&sql).await {
                writeln!(self.out, "could not fetch recommendations: {error}")?;
            }
        }
        Ok(())
    }

    async fn print_recommendations(&mut self, query: &str) -> Result<(), ShellError> {
        let recommendations = self.session.recommend_indexes(query).await?;
        if recommendations.is_empty() {
            writeln!(self.out, "No index recommendations")?;
        }
        for recommendation in recommendations {
            writeln!(
                self.out,
                "{}.{}: {}",
                recommendation.table,
                recommendation.column,
                recommendation.reason.as_deref().unwrap_or("suggested index")
            )?;
            if let Some(sql) = recommendation.sql {
                writeln!(self.out, "    {sql}")?;
            }
        }
        Ok(())
    }

    fn print_connect(&mut self, report: &ConnectReport) -> Result<(), ShellError> {
        writeln!(
            self.out,
            "{} ({}ms)",
            report.outcome.message,
            report.outcome.latency.as_millis()
        )?;
        match (&report.schema, &report.schema_error) {
            (Some(schema), _) => writeln!(self.out, "{} tables loaded", schema.tables.len())?,
            (None, Some(error)) => writeln!(self.out, "schema unavailable: {error}")?,
            (None, None) => {}
        }
        Ok(())
    }

    fn print_status(&mut self) -> Result<(), ShellError> {
        let status = self.session.status();
        if !status.is_connected {
            writeln!(self.out, "Not connected")?;
        } else {
            let kind = status.kind.map_or("unknown", DatabaseKind::as_str);
            let database = status.database.as_deref().unwrap_or("-");
            match status.host.as_deref() {
                Some(host) => writeln!(self.out, "Connected to {kind} `{database}` on {host}")?,
                None => writeln!(self.out, "Connected to {kind} `{database}`")?,
            }
            if let (Some(connected_at), Some(latency)) =
                (status.connected_at, status.last_latency)
            {
                writeln!(
                    self.out,
                    "  since {} (connect took {}ms)",
                    connected_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    latency.as_millis()
                )?;
            }
        }
        writeln!(
            self.out,
            "Successful runs: {}",
            self.session.results().successful_runs()
        )?;

        let user = self
            .session
            .user()
            .map_or_else(|| "anonymous".to_string(), |user| user.username.clone());
        writeln!(self.out, "User: {user} ({})", self.session.role())?;
        writeln!(
            self.out,
            "Auto-explain: {}",
            if self.session.auto_explain() { "on" } else { "off" }
        )?;
        Ok(())
    }

    fn print_performance(&mut self) -> Result<(), ShellError> {
        let log = self.session.performance();
        if log.is_empty() {
            writeln!(self.out, "No runs recorded")?;
            return Ok(());
        }
        let lines = log
            .records()
            .rev()
            .take(PERF_LINES)
            .map(|record| {
                format!(
                    "{}  {:>9.1}ms  {:>6} rows  {}",
                    record.timestamp, record.duration_ms, record.row_count, record.query_prefix
                )
            })
            .collect::<Vec<_>>();
        for line in lines {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }
}

pub fn render_outcome(outcome: &ExecutionOutcome) -> String {
    let mut rendered = String::new();
    if outcome.is_empty() {
        rendered.push_str("Query executed (no result sets)\n");
    }
    for statement in &outcome.statements {
        rendered.push_str(&render_statement(statement, MAX_RENDERED_ROWS));
    }
    if let Some(plan) = &outcome.explanation {
        rendered.push_str("Plan:\n");
        rendered.push_str(&pretty(plan));
        rendered.push('\n');
    }
    rendered.push_str(&format!("Time: {:.1}ms\n", outcome.elapsed_ms()));
    rendered
}

/// Aligned text table of one statement, truncated to `max_rows`.
pub fn render_statement(statement: &StatementResult, max_rows: usize) -> String {
    let mut rendered = String::new();
    if !statement.has_rows() {
        let message = statement.message.as_deref().unwrap_or("OK");
        rendered.push_str(message);
        rendered.push('\n');
        return rendered;
    }

    let shown = statement
        .rows
        .iter()
        .take(max_rows)
        .map(|row| row.iter().map(display_cell).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let mut widths = statement
        .columns
        .iter()
        .map(|column| column.chars().count())
        .collect::<Vec<_>>();
    for row in &shown {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    rendered.push_str(&format_row(&statement.columns, &widths));
    rendered.push_str(
        &widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    rendered.push('\n');
    for row in &shown {
        rendered.push_str(&format_row(row, &widths));
    }

    let total = statement.row_count();
    if total > shown.len() {
        rendered.push_str(&format!("({} of {total} rows shown)\n", shown.len()));
    } else {
        rendered.push_str(&format!("({total} rows)\n"));
    }
    rendered
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    let mut line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ");
    line.truncate(line.trim_end().len());
    line.push('\n');
    line
}

fn display_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        other => cell_text(other),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
