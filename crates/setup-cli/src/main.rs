//! setupctl
//!
//! Command-line front end for the setup browser engine. Every command opens
//! one form package against an in-memory configuration provider seeded from
//! an optional state file; commands that save write the provider state back
//! to that file.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use setup_engine::{
    BrowserError, ChangeOutcome, Engine, EngineConfig, EvalError, FormSetHandle, Gating, Host,
    MemoryRouting, MemoryVariables, ProviderData, SubmitScope, SubmitStatus,
};
use setup_types::package::FormSetPackage;
use setup_types::{DefaultId, FormId, Opcode, PackageError, QuestionId, TypedValue};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const HANDLE: FormSetHandle = FormSetHandle(1);

#[derive(Parser)]
#[command(name = "setupctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Setup browser - inspect, edit and submit form packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every question with its value and gating
    Show {
        #[command(flatten)]
        session: Session,

        /// Only this form
        #[arg(long)]
        form: Option<u16>,
    },

    /// Evaluate an opcode list (JSON array) in the context of a form
    Eval {
        #[command(flatten)]
        session: Session,

        /// Opcode list, e.g. '[{"op":"one"},{"op":"one"},{"op":"add"}]'
        opcodes: String,

        #[arg(long, default_value_t = 1)]
        form: u16,
    },

    /// Apply the assignments and report what each change did
    Set {
        #[command(flatten)]
        session: Session,
    },

    /// Apply the assignments, then submit
    Submit {
        #[command(flatten)]
        session: Session,

        #[arg(long, default_value_t = 1)]
        form: u16,

        #[arg(long, value_enum, default_value_t = ScopeArg::FormSet)]
        scope: ScopeArg,
    },

    /// Apply the assignments, then discard
    Discard {
        #[command(flatten)]
        session: Session,

        #[arg(long, default_value_t = 1)]
        form: u16,

        #[arg(long, value_enum, default_value_t = ScopeArg::FormSet)]
        scope: ScopeArg,
    },

    /// Load a default class into the edit copy
    Defaults {
        #[command(flatten)]
        session: Session,

        /// Default class (0 standard, 1 manufacturing, 2 safe)
        #[arg(long, default_value_t = 0)]
        class: u16,

        /// Only this form
        #[arg(long)]
        form: Option<u16>,

        /// Submit the whole form set afterwards
        #[arg(long)]
        save: bool,
    },
}

#[derive(Args)]
struct Session {
    /// Form package (JSON)
    package: PathBuf,

    /// Provider state (JSON), read on start and written back on save
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Change applied before the command runs
    #[arg(short = 'a', long = "assign", value_name = "QUESTION=VALUE")]
    assignments: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    Form,
    FormSet,
    System,
}

impl From<ScopeArg> for SubmitScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Form => Self::Form,
            ScopeArg::FormSet => Self::FormSet,
            ScopeArg::System => Self::System,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
enum CliError {
    #[error("cannot read `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write `{}`: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in `{}`: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid assignment `{0}`, expected QUESTION=VALUE")]
    Assignment(String),

    #[error("invalid opcode list: {0}")]
    Opcodes(serde_json::Error),

    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("cannot render output: {0}")]
    Output(serde_json::Error),
}

type CliResult<T> = Result<T, CliError>;

// ══════════════════════════════════════════════════════════════════════════════
// Provider state file
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProviderState {
    #[serde(default)]
    stores: Vec<StoreEntry>,
    #[serde(default)]
    variables: Vec<VariableEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreEntry {
    guid: Uuid,
    name: String,
    data: ProviderData,
}

#[derive(Debug, Serialize, Deserialize)]
struct VariableEntry {
    guid: Uuid,
    name: String,
    data: Vec<u8>,
}

impl ProviderState {
    fn install(&self, routing: &MemoryRouting, variables: &MemoryVariables) {
        for store in &self.stores {
            routing.insert(store.guid, &store.name, store.data.clone());
        }
        for var in &self.variables {
            variables.insert(var.guid, &var.name, var.data.clone());
        }
    }

    fn capture(routing: &MemoryRouting, variables: &MemoryVariables) -> Self {
        Self {
            stores: routing
                .stores()
                .into_iter()
                .map(|(guid, name, data)| StoreEntry { guid, name, data })
                .collect(),
            variables: variables
                .variables()
                .into_iter()
                .map(|(guid, name, data)| VariableEntry { guid, name, data })
                .collect(),
        }
    }
}

fn read_text(path: &Path) -> CliResult<String> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> CliResult<T> {
    serde_json::from_str(&read_text(path)?).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Session
// ══════════════════════════════════════════════════════════════════════════════

struct Opened {
    engine: Engine,
    routing: MemoryRouting,
    variables: MemoryVariables,
    state_path: Option<PathBuf>,
}

impl Opened {
    fn open(session: &Session) -> CliResult<Self> {
        let config = match &session.config {
            Some(path) => read_json::<EngineConfig>(path)?,
            None => EngineConfig::default(),
        };
        let routing = MemoryRouting::new();
        let variables = MemoryVariables::new();
        if let Some(path) = session.state.as_deref().filter(|p| p.exists()) {
            read_json::<ProviderState>(path)?.install(&routing, &variables);
        }

        let package = FormSetPackage::from_json(&read_text(&session.package)?)?;
        let mut engine = Engine::new(Host::new(routing.clone(), variables.clone()), config);
        engine.open_formset(HANDLE, &package)?;
        debug!(package = %session.package.display(), "package opened");
        Ok(Self {
            engine,
            routing,
            variables,
            state_path: session.state.clone(),
        })
    }

    /// Apply every `QUESTION=VALUE` through the interactive change path.
    fn apply(&mut self, assignments: &[String]) -> CliResult<Vec<(QuestionId, ChangeOutcome)>> {
        let mut outcomes = Vec::new();
        for assignment in assignments {
            let (question, value) = self.parse_assignment(assignment)?;
            let outcome = self.engine.change_question(HANDLE, question, value)?;
            if let Some(message) = &outcome.inconsistent {
                warn!(%question, "change reverted: {message}");
            }
            outcomes.push((question, outcome));
        }
        Ok(outcomes)
    }

    fn parse_assignment(&mut self, assignment: &str) -> CliResult<(QuestionId, TypedValue)> {
        let bad = || CliError::Assignment(assignment.to_string());
        let (question, raw) = assignment.split_once('=').ok_or_else(bad)?;
        let question = QuestionId(question.trim().parse().map_err(|_| bad())?);
        let kind = self.engine.question(HANDLE, question)?.value_kind();

        let value = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Number(n)) => {
                TypedValue::from_u64(kind, n.as_u64().ok_or_else(bad)?)
            }
            Ok(Value::Bool(b)) => TypedValue::Bool(b),
            Ok(Value::String(text)) => TypedValue::String(self.engine.intern_string(HANDLE, &text)?),
            Ok(other) => serde_json::from_value(other).map_err(|_| bad())?,
            Err(_) => TypedValue::String(self.engine.intern_string(HANDLE, raw)?),
        };
        Ok((question, value))
    }

    fn save(&self) -> CliResult<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let state = ProviderState::capture(&self.routing, &self.variables);
        let text = serde_json::to_string_pretty(&state).map_err(CliError::Output)?;
        fs::write(path, text).map_err(|source| CliError::Write {
            path: path.clone(),
            source,
        })
    }

    /// A value as JSON, with string ids resolved to their text.
    fn render(&self, value: &TypedValue) -> CliResult<Value> {
        match value {
            TypedValue::String(id) => Ok(self
                .engine
                .resolve_string(HANDLE, *id)
                .map_or(Value::Null, Value::String)),
            other => serde_json::to_value(other).map_err(CliError::Output),
        }
    }

    fn questions(&mut self, form: Option<u16>) -> CliResult<Vec<Value>> {
        let targets: Vec<(FormId, QuestionId)> = self
            .engine
            .formset(HANDLE)?
            .forms
            .iter()
            .filter(|f| form.map_or(true, |id| f.id == FormId(id)))
            .flat_map(|f| f.questions.iter().map(move |q| (f.id, q.id)))
            .collect();

        let mut rows = Vec::new();
        for (form, question) in targets {
            let gating: Gating = self.engine.question_gating(HANDLE, question)?;
            let value = self.engine.question_value(HANDLE, question)?;
            rows.push(json!({
                "form": form,
                "question": question,
                "gating": gating,
                "value": self.render(&value)?,
            }));
        }
        Ok(rows)
    }
}

fn print(value: &Value) -> CliResult<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).map_err(CliError::Output)?
    );
    Ok(())
}

fn outcome_json(question: QuestionId, outcome: &ChangeOutcome) -> Value {
    json!({
        "question": question,
        "applied": outcome.applied,
        "warnings": outcome.warnings,
        "inconsistent": outcome.inconsistent,
    })
}

fn status_json(opened: &Opened, status: &SubmitStatus) -> Value {
    match status {
        SubmitStatus::Submitted => json!({"status": "submitted"}),
        SubmitStatus::NothingToSubmit => json!({"status": "nothing_to_submit"}),
        SubmitStatus::Rejected {
            form,
            question,
            message,
            ..
        } => json!({
            "status": "rejected",
            "form": form,
            "question": question,
            "message": message,
        }),
        SubmitStatus::SaveFailed {
            failures,
            discarded,
        } => json!({
            "status": "save_failed",
            "discarded": discarded,
            "failures": failures
                .iter()
                .map(|f| json!({
                    "storage": f.storage_name,
                    "question": f.question,
                    "reason": f.reason,
                    "elements": f.elements.len(),
                }))
                .collect::<Vec<_>>(),
            "state": format!("{:?}", opened.engine.formset(HANDLE).map(|fs| fs.state).unwrap_or_default()),
        }),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Commands
// ══════════════════════════════════════════════════════════════════════════════

fn run(command: Commands) -> CliResult<ExitCode> {
    match command {
        Commands::Show { session, form } => {
            let mut opened = Opened::open(&session)?;
            opened.apply(&session.assignments)?;
            let state = format!("{:?}", opened.engine.formset(HANDLE)?.state);
            let questions = opened.questions(form)?;
            print(&json!({"state": state, "questions": questions}))?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Eval {
            session,
            opcodes,
            form,
        } => {
            let mut opened = Opened::open(&session)?;
            opened.apply(&session.assignments)?;
            let ops: Vec<Opcode> = serde_json::from_str(&opcodes).map_err(CliError::Opcodes)?;
            let value = opened.engine.evaluate(HANDLE, FormId(form), &ops)?;
            print(&opened.render(&value)?)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Set { session } => {
            let mut opened = Opened::open(&session)?;
            let outcomes = opened.apply(&session.assignments)?;
            let rows: Vec<Value> = outcomes
                .iter()
                .map(|(q, outcome)| outcome_json(*q, outcome))
                .collect();
            print(&Value::Array(rows))?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Submit {
            session,
            form,
            scope,
        } => {
            let mut opened = Opened::open(&session)?;
            opened.apply(&session.assignments)?;
            let status = opened
                .engine
                .submit(HANDLE, FormId(form), scope.into())?;
            opened.save()?;
            print(&status_json(&opened, &status))?;
            Ok(match status {
                SubmitStatus::Submitted | SubmitStatus::NothingToSubmit => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            })
        }

        Commands::Discard {
            session,
            form,
            scope,
        } => {
            let mut opened = Opened::open(&session)?;
            opened.apply(&session.assignments)?;
            let changed = opened
                .engine
                .discard(HANDLE, FormId(form), scope.into())?;
            let questions: Vec<QuestionId> = changed.into_iter().map(|(_, q)| q).collect();
            print(&json!({"discarded": questions}))?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Defaults {
            session,
            class,
            form,
            save,
        } => {
            let mut opened = Opened::open(&session)?;
            opened.apply(&session.assignments)?;
            let applied = opened
                .engine
                .extract_default(HANDLE, form.map(FormId), DefaultId(class))?;
            let mut report = json!({"applied": applied, "questions": opened.questions(form)?});
            if save {
                let status = opened
                    .engine
                    .submit(HANDLE, FormId(form.unwrap_or(1)), SubmitScope::FormSet)?;
                opened.save()?;
                report["submit"] = status_json(&opened, &status);
            }
            print(&report)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("setup_engine=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("setupctl: {err}");
            ExitCode::FAILURE
        }
    }
}
