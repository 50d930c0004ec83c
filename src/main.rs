use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinic_core::config::{
    admin_emails_from_env_value, allowed_types_from_env_value, max_upload_bytes_from_env_value,
};
use clinic_core::notify::{Notification, NotificationKind};
use clinic_core::store::{AccessRules, StoreSnapshot};
use clinic_core::upcoming::upcoming_index;
use clinic_core::view::{EmbedKind, EntryListView, UpcomingPanelView};
use clinic_core::writer::FileProgress;
use clinic_core::{
    App, AppointmentForm, BackendConfig, CatalogKind, CoreConfig, EntryEdit, ExamForm,
    IdentityProvider, MemoryDocumentStore, Principal, SelectedFile, Services, StaticIdentity,
};
use clinic_files::{
    LocalObjectStore, ObjectPath, UploadPolicy, DEFAULT_ALLOWED_TYPES, DEFAULT_MAX_UPLOAD_BYTES,
};
use clinic_types::EmailAddress;
use clinic_uuid::DocumentId;

const DOCUMENTS_FILE: &str = "documents.json";
const OBJECTS_DIR: &str = "objects";

#[derive(Parser)]
#[command(name = "clinic")]
#[command(about = "Clinic patient records viewer")]
struct Cli {
    /// Patient to work on (defaults to the first patient)
    #[arg(long, global = true)]
    patient: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show who is signed in
    Whoami,
    /// List patients
    Patients,
    /// Create a patient
    AddPatient {
        /// Patient name
        name: String,
    },
    /// List or extend a catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// List entries, newest first
    Entries {
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Show one entry with its attachments
    Show {
        /// Entry id
        entry_id: String,
        /// Attachment to focus (0-based)
        #[arg(long)]
        attachment: Option<usize>,
    },
    /// Record an appointment
    AddAppointment(AppointmentArgs),
    /// Record an exam
    AddExam(ExamArgs),
    /// Scheduled appointments in the next 14 days
    Upcoming,
    /// Edit an entry's text and status (admin)
    Edit {
        /// Entry id
        entry_id: String,
        /// New summary or comment
        #[arg(long, default_value = "")]
        text: String,
        /// New status (appointments only)
        #[arg(long, default_value = "")]
        status: String,
    },
    /// Delete an entry and its attachments (admin)
    Delete {
        /// Entry id
        entry_id: String,
    },
    /// Delete one attachment of an entry (admin)
    DeleteAttachment {
        /// Entry id
        entry_id: String,
        /// Object path of the attachment
        path: String,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List the items of a catalog
    List { kind: KindArg },
    /// Add an item to a catalog
    Add {
        kind: KindArg,
        name: String,
        /// Doctors only
        #[arg(long)]
        specialty: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Clinic,
    Doctor,
    Companion,
}

impl From<KindArg> for CatalogKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Clinic => CatalogKind::Clinic,
            KindArg::Doctor => CatalogKind::Doctor,
            KindArg::Companion => CatalogKind::Companion,
        }
    }
}

#[derive(Args)]
struct AppointmentArgs {
    /// Date and time, e.g. 2025-03-01T09:30
    #[arg(long)]
    date: String,
    #[arg(long, default_value = "")]
    clinic: String,
    #[arg(long, default_value = "")]
    doctor: String,
    /// Ignored when the doctor has a specialty in the catalog
    #[arg(long, default_value = "")]
    specialty: String,
    #[arg(long, default_value = "")]
    status: String,
    #[arg(long, default_value = "")]
    companion: String,
    #[arg(long, default_value = "")]
    summary: String,
    /// Attachment to upload (repeatable)
    #[arg(long = "file")]
    files: Vec<PathBuf>,
}

#[derive(Args)]
struct ExamArgs {
    /// Date and time, e.g. 2025-03-01T09:30
    #[arg(long)]
    date: String,
    #[arg(long, default_value = "")]
    clinic: String,
    #[arg(long, default_value = "")]
    companion: String,
    #[arg(long, default_value = "")]
    comment: String,
    /// Attachment to upload (repeatable)
    #[arg(long = "file")]
    files: Vec<PathBuf>,
}

/// Document store persisted as a JSON snapshot under the data directory.
struct Workspace {
    snapshot_path: PathBuf,
    documents: Arc<MemoryDocumentStore>,
}

impl Workspace {
    async fn open(data_dir: &Path, documents: Arc<MemoryDocumentStore>) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("creating {}", data_dir.display()))?;

        let snapshot_path = data_dir.join(DOCUMENTS_FILE);
        if tokio::fs::try_exists(&snapshot_path).await? {
            let raw = tokio::fs::read_to_string(&snapshot_path).await?;
            let snapshot: StoreSnapshot = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", snapshot_path.display()))?;
            documents.import(snapshot).await?;
        }
        documents.add_index(upcoming_index()).await;

        Ok(Self {
            snapshot_path,
            documents,
        })
    }

    async fn save(&self) -> anyhow::Result<()> {
        let snapshot = self.documents.export().await;
        let raw = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(&self.snapshot_path, raw)
            .await
            .with_context(|| format!("writing {}", self.snapshot_path.display()))?;
        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn load_config() -> anyhow::Result<CoreConfig> {
    let project_id = env_value("CLINIC_PROJECT_ID").unwrap_or_else(|| "clinic-local".into());
    let backend = BackendConfig::new(
        &project_id,
        env_value("CLINIC_API_KEY"),
        env_value("CLINIC_STORAGE_BUCKET"),
    )?;
    let admins = admin_emails_from_env_value(env_value("CLINIC_ADMIN_EMAILS"))?;
    let max_bytes = max_upload_bytes_from_env_value(
        env_value("CLINIC_MAX_UPLOAD_BYTES"),
        DEFAULT_MAX_UPLOAD_BYTES,
    )?;
    let allowed = allowed_types_from_env_value(env_value("CLINIC_ALLOWED_TYPES"), DEFAULT_ALLOWED_TYPES);
    Ok(CoreConfig::new(
        backend,
        admins,
        UploadPolicy::new(max_bytes, allowed),
    )?)
}

/// Reads a file to attach. The content type is sniffed from the bytes.
async fn read_selected(path: &Path) -> anyhow::Result<SelectedFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();
    let content_type = infer::get(&bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_default();
    Ok(SelectedFile::new(name, content_type, bytes))
}

async fn read_all(paths: &[PathBuf]) -> anyhow::Result<Vec<SelectedFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(read_selected(path).await?);
    }
    Ok(files)
}

fn file_names(files: &[SelectedFile]) -> Vec<String> {
    files.iter().map(|f| f.name.clone()).collect()
}

fn progress_printer(names: Vec<String>) -> impl FnMut(FileProgress) + Send {
    move |p: FileProgress| {
        if let Some(name) = names.get(p.index) {
            eprintln!("  {} {}%", name, p.percent);
        }
    }
}

fn print_notifications(notifications: Vec<Notification>) {
    for n in notifications {
        let tag = match n.kind {
            NotificationKind::Info => "info",
            NotificationKind::Ok => "ok",
            NotificationKind::Warn => "aviso",
            NotificationKind::Error => "error",
        };
        eprintln!("[{}] {}", tag, n.message);
    }
}

fn print_entry_list(list: &EntryListView) {
    if list.rows.is_empty() {
        println!("Sin entradas.");
        return;
    }
    for row in &list.rows {
        println!("{}  {}  {}", row.date, row.kind_label, row.id);
        println!("    Clínica: {}  Médico: {}", row.clinic, row.doctor);
        if let Some(status) = &row.status {
            println!("    Estado: {}", status);
        }
        println!("    {}", row.summary);
        println!("    Acompañante: {}", row.companion);
        match row.attachments_badge() {
            Some(badge) => println!("    {}", badge),
            None => {
                for chip in &row.chips {
                    println!("    [{}] {}", chip.attachment_index, chip.label);
                }
            }
        }
    }
    if list.load_more_enabled {
        println!("(hay más entradas: usa --pages)");
    }
}

async fn load_until_found(app: &mut App, entry_id: &DocumentId) {
    while app.state().pager.find(entry_id).is_none() && app.state().pager.can_load_more() {
        if app.load_more().await == 0 && !app.state().pager.can_load_more() {
            break;
        }
    }
}

async fn run(app: &mut App, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Whoami => {
            let session = app.session();
            if session.label.is_empty() {
                println!("Sin sesión (define CLINIC_USER)");
            } else {
                println!("{}", session.label);
                if let Some(name) = app.state().principal.as_ref().and_then(|p| p.display_name()) {
                    println!("{}", name);
                }
            }
        }
        Commands::Patients => {
            let selected = app
                .state()
                .current_patient
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            for option in app.patient_options().iter().filter(|o| !o.value.is_empty()) {
                let marker = if option.value == selected { "*" } else { " " };
                println!("{} {}  {}", marker, option.value, option.label);
            }
        }
        Commands::AddPatient { name } => {
            if let Some(id) = app.add_patient(&name).await {
                println!("{}", id);
            }
        }
        Commands::Catalog { action } => match action {
            CatalogAction::List { kind } => {
                for item in app.state().catalogs.items(kind.into()) {
                    println!("{}  {}", item.id, item.label());
                }
            }
            CatalogAction::Add {
                kind,
                name,
                specialty,
            } => {
                if let Some(id) = app
                    .add_catalog_item(kind.into(), &name, specialty.as_deref())
                    .await
                {
                    println!("{}", id);
                }
            }
        },
        Commands::Entries { pages } => {
            for _ in 1..pages.max(1) {
                if !app.state().pager.can_load_more() {
                    break;
                }
                app.load_more().await;
            }
            print_entry_list(&app.entry_list());
        }
        Commands::Show {
            entry_id,
            attachment,
        } => {
            let entry_id = DocumentId::parse(&entry_id)?;
            load_until_found(app, &entry_id).await;
            let detail = app
                .entry_detail(&entry_id, attachment)
                .with_context(|| format!("entry {} not found", entry_id))?;
            println!("{}  {}", detail.date, detail.kind_label);
            println!("Clínica: {}", detail.clinic);
            println!("Médico: {}", detail.doctor);
            println!("Acompañante: {}", detail.companion);
            println!("{}: {}", detail.text_label, detail.text);
            for (i, a) in detail.attachments.iter().enumerate() {
                let focus = if detail.focus == Some(i) { ">" } else { " " };
                let preview = match a.embed {
                    EmbedKind::Pdf => "pdf",
                    EmbedKind::Image => "imagen",
                    EmbedKind::None => "descarga",
                };
                println!("{} [{}] {} {} {} ({})", focus, i, a.name, a.meta, a.url, preview);
                if a.can_delete {
                    println!("      ruta: {}", a.path);
                }
            }
        }
        Commands::AddAppointment(args) => {
            let files = read_all(&args.files).await?;
            let mut progress = progress_printer(file_names(&files));
            let form = AppointmentForm {
                date_time: args.date,
                clinic_id: args.clinic,
                doctor_id: args.doctor,
                specialty: args.specialty,
                status: args.status,
                companion_id: args.companion,
                summary: args.summary,
            };
            if let Some(receipt) = app.submit_appointment(form, files, &mut progress).await {
                println!("{}", receipt.entry_id);
            }
        }
        Commands::AddExam(args) => {
            let files = read_all(&args.files).await?;
            let mut progress = progress_printer(file_names(&files));
            let form = ExamForm {
                date_time: args.date,
                clinic_id: args.clinic,
                companion_id: args.companion,
                comment: args.comment,
            };
            if let Some(receipt) = app.submit_exam(form, files, &mut progress).await {
                println!("{}", receipt.entry_id);
            }
        }
        Commands::Upcoming => match app.upcoming_panel() {
            UpcomingPanelView::Empty => println!("Sin próximas citas."),
            UpcomingPanelView::Unavailable { message } => println!("{}", message),
            UpcomingPanelView::Items(items) => {
                for item in items {
                    println!("{}  {}  {}", item.date, item.kind_label, item.clinic);
                }
            }
        },
        Commands::Edit {
            entry_id,
            text,
            status,
        } => {
            let entry_id = DocumentId::parse(&entry_id)?;
            app.edit_entry(&entry_id, &EntryEdit { text, status }).await;
        }
        Commands::Delete { entry_id } => {
            let entry_id = DocumentId::parse(&entry_id)?;
            app.delete_entry(&entry_id).await;
        }
        Commands::DeleteAttachment { entry_id, path } => {
            let entry_id = DocumentId::parse(&entry_id)?;
            let path = ObjectPath::parse(&path)?;
            app.delete_attachment(&entry_id, &path).await;
        }
    }
    Ok(())
}

/// Entry point of the `clinic` command.
///
/// # Environment Variables
/// - `CLINIC_DATA_DIR`: local workspace holding documents and objects (default: "clinic_data")
/// - `CLINIC_USER`: email of the signed-in account; unset means signed out
/// - `CLINIC_ADMIN_EMAILS`: comma-separated admin allow-list
/// - `CLINIC_PROJECT_ID`, `CLINIC_API_KEY`, `CLINIC_STORAGE_BUCKET`: backend identifiers
/// - `CLINIC_MAX_UPLOAD_BYTES`, `CLINIC_ALLOWED_TYPES`: attachment policy
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config()?;
    let data_dir = PathBuf::from(env_value("CLINIC_DATA_DIR").unwrap_or_else(|| "clinic_data".into()));

    let user = env_value("CLINIC_USER")
        .map(|email| EmailAddress::parse(email.trim()))
        .transpose()?;
    let identity = Arc::new(match &user {
        Some(email) => StaticIdentity::new(Some(Principal::new(
            email.clone(),
            env_value("CLINIC_USER_NAME"),
        ))),
        None => StaticIdentity::unavailable(),
    });

    let documents = Arc::new(MemoryDocumentStore::with_rules(AccessRules::AdminWrites {
        policy: config.access_policy().clone(),
        session: identity.session(),
    }));
    let workspace = Workspace::open(&data_dir, documents.clone()).await?;
    let objects_dir = data_dir.join(OBJECTS_DIR);
    tokio::fs::create_dir_all(&objects_dir).await?;
    let objects = Arc::new(LocalObjectStore::new(&objects_dir)?);

    tracing::info!(
        project = config.backend().project_id(),
        data_dir = %data_dir.display(),
        "opening clinic workspace"
    );

    let mut app = App::new(
        config,
        Services {
            documents,
            objects,
            identity,
        },
    );
    if user.is_some() {
        app.sign_in().await;
    }
    app.init().await;
    if let Some(patient) = cli.patient {
        app.select_patient(Some(DocumentId::parse(&patient)?)).await;
    }

    let result = run(&mut app, cli.command).await;
    print_notifications(app.take_notifications());
    workspace.save().await?;
    result
}
