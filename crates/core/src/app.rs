//! Application controller.
//!
//! [`App`] owns the state of one viewer session: who is signed in, which
//! patient is selected, the catalogs, the entry pager and the upcoming panel.
//! User actions never return errors to the caller. Failures are logged and
//! surfaced as [`Notification`]s, and the views are recomputed from state.

use crate::admin::AdminEditor;
use crate::catalog::{add_catalog_item, Catalogs, SelectBinding, SelectOption};
use crate::config::CoreConfig;
use crate::identity::{AdminCapability, IdentityProvider, Principal};
use crate::model::{AppointmentForm, CatalogKind, EntryDraft, EntryEdit, ExamForm};
use crate::notify::{Notification, Notifier};
use crate::pager::{EntryPager, SnapshotOutcome};
use crate::patient::{create_patient, PatientDirectory};
use crate::store::DocumentStore;
use crate::upcoming::{fetch_upcoming, UpcomingOutcome};
use crate::view::{
    entry_detail, entry_list, session_view, upcoming_panel, upload_rows, EntryDetailView,
    EntryListView, SessionView, UploadRowView, UpcomingPanelView,
};
use crate::writer::{EntryReceipt, EntryWriter, FileProgress, SelectedFile};
use crate::{CoreError, CoreResult};
use chrono::Utc;
use clinic_files::{ObjectPath, ObjectStore, Rejection};
use clinic_uuid::DocumentId;
use std::sync::Arc;
use tokio::sync::watch;

pub const MSG_SELECT_PATIENT: &str = "Selecciona un paciente";
pub const MSG_INVALID_DATE: &str = "Fecha/hora inválida";
pub const MSG_SAVED: &str = "Guardado";
pub const MSG_SAVE_FAILED: &str = "No se pudo guardar";
pub const MSG_UPLOAD_FAILED: &str = "Error subiendo adjuntos";
pub const MSG_HISTORY_FAILED: &str = "No se pudo cargar el historial (revisa reglas/índices)";
pub const MSG_CATALOGS_FAILED: &str = "No se pudieron cargar los catálogos";
pub const MSG_PATIENTS_FAILED: &str = "No se pudieron cargar los pacientes";
pub const MSG_PATIENT_CREATED: &str = "Paciente creado";
pub const MSG_PATIENT_FAILED: &str = "No se pudo crear el paciente";
pub const MSG_CATALOG_ADDED: &str = "Añadido al catálogo";
pub const MSG_CATALOG_FAILED: &str = "No se pudo añadir";
pub const MSG_EDITED: &str = "Cambios guardados";
pub const MSG_EDIT_FAILED: &str = "No se pudo editar (solo admin)";
pub const MSG_ATTACHMENT_DELETED: &str = "Adjunto eliminado";
pub const MSG_ATTACHMENT_DELETE_FAILED: &str = "No se pudo eliminar adjunto (solo admin)";
pub const MSG_ENTRY_DELETED: &str = "Entrada eliminada";
pub const MSG_ENTRY_DELETE_FAILED: &str = "No se pudo eliminar (solo admin)";
pub const MSG_SIGN_IN_FAILED: &str = "No se pudo iniciar sesión";
pub const MSG_SIGNED_OUT: &str = "Sesión cerrada";

const MIB: u64 = 1024 * 1024;

fn megabytes(bytes: u64) -> String {
    if bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{:.2}MB", bytes as f64 / MIB as f64)
    }
}

fn rejection_message(rejection: &Rejection) -> String {
    match rejection {
        Rejection::TooLarge { name, limit, .. } => {
            format!("“{}” supera {}", name, megabytes(*limit))
        }
        Rejection::DisallowedType { content_type, .. } => {
            format!("Tipo no permitido: {}", content_type)
        }
    }
}

/// Backends the controller talks to.
#[derive(Clone)]
pub struct Services {
    pub documents: Arc<dyn DocumentStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

/// Session state the views are computed from.
#[derive(Default)]
pub struct AppState {
    pub principal: Option<Principal>,
    pub is_admin: bool,
    pub current_patient: Option<DocumentId>,
    pub patients: PatientDirectory,
    pub catalogs: Catalogs,
    pub pager: EntryPager,
    pub upcoming: UpcomingOutcome,
    /// Rows of the last submission; cleared once an entry is saved.
    pub uploads: Vec<UploadRowView>,
}

pub struct App {
    services: Services,
    config: CoreConfig,
    state: AppState,
    notifier: Notifier,
    auth_changes: watch::Receiver<Option<Principal>>,
}

impl App {
    pub fn new(config: CoreConfig, services: Services) -> Self {
        let session = services.identity.session();
        let mut auth_changes = session.watch();
        let principal = auth_changes.borrow_and_update().clone();
        let is_admin = config.access_policy().is_admin(principal.as_ref());

        Self {
            services,
            config,
            state: AppState {
                principal,
                is_admin,
                ..AppState::default()
            },
            notifier: Notifier::default(),
            auth_changes,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.state.pager = EntryPager::with_page_size(page_size);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Loads patients (selecting the first one) and every catalog.
    pub async fn init(&mut self) {
        self.sync_auth();
        self.reload_patients().await;
        if let Err(e) = self.load_catalogs().await {
            tracing::error!(error = %e, "catalog load failed");
            self.notifier.error(MSG_CATALOGS_FAILED);
        }
        tracing::info!(
            patients = self.state.patients.patients().len(),
            selected = ?self.state.current_patient.as_ref().map(ToString::to_string),
            "viewer initialised"
        );
    }

    // Session

    /// Picks up sign-in changes made through the identity provider. Returns
    /// whether anything changed.
    pub fn sync_auth(&mut self) -> bool {
        if !self.auth_changes.has_changed().unwrap_or(false) {
            return false;
        }
        let principal = self.auth_changes.borrow_and_update().clone();
        self.state.is_admin = self.config.access_policy().is_admin(principal.as_ref());
        tracing::info!(
            user = ?principal.as_ref().map(|p| p.email().to_string()),
            is_admin = self.state.is_admin,
            "session changed"
        );
        self.state.principal = principal;
        true
    }

    pub async fn sign_in(&mut self) {
        if let Err(e) = self.services.identity.sign_in().await {
            tracing::error!(error = %e, "sign-in failed");
            self.notifier.error(MSG_SIGN_IN_FAILED);
        }
        self.sync_auth();
    }

    pub async fn sign_out(&mut self) {
        match self.services.identity.sign_out().await {
            Ok(()) => self.notifier.info(MSG_SIGNED_OUT),
            Err(e) => tracing::error!(error = %e, "sign-out failed"),
        }
        self.sync_auth();
    }

    /// The single session button: signs out when signed in, in otherwise.
    pub async fn toggle_session(&mut self) {
        if self.state.principal.is_some() {
            self.sign_out().await;
        } else {
            self.sign_in().await;
        }
    }

    fn admin_capability(&self) -> Option<AdminCapability> {
        self.config
            .access_policy()
            .admin_capability(self.state.principal.as_ref())
    }

    // Patients

    /// Reloads the patient list. Selects the first patient when none is selected.
    pub async fn reload_patients(&mut self) {
        if let Err(e) = self.state.patients.reload(self.services.documents.as_ref()).await {
            tracing::error!(error = %e, "patient list load failed");
            self.notifier.error(MSG_PATIENTS_FAILED);
            return;
        }
        if self.state.current_patient.is_none() {
            let first = self.state.patients.first().map(|p| p.id.clone());
            if first.is_some() {
                self.select_patient(first).await;
            }
        }
    }

    /// Creates a patient and selects it. Blank names are ignored.
    pub async fn add_patient(&mut self, name: &str) -> Option<DocumentId> {
        if name.trim().is_empty() {
            return None;
        }
        let created_by = self.state.principal.as_ref().map(|p| p.email().clone());
        match create_patient(self.services.documents.as_ref(), name, created_by.as_ref()).await {
            Ok(id) => {
                self.notifier.ok(MSG_PATIENT_CREATED);
                self.reload_patients().await;
                self.select_patient(Some(id.clone())).await;
                Some(id)
            }
            Err(e) => {
                tracing::error!(error = %e, "patient creation failed");
                self.notifier.error(MSG_PATIENT_FAILED);
                None
            }
        }
    }

    /// Switches the live listing to `patient_id` and refreshes the upcoming panel.
    pub async fn select_patient(&mut self, patient_id: Option<DocumentId>) {
        if let Some(patient) = patient_id.as_ref().and_then(|id| self.state.patients.get(id)) {
            tracing::info!(patient_id = %patient.id, name = patient.display_name(), "patient selected");
        }
        self.state.current_patient = patient_id.clone();
        self.state.uploads.clear();
        match self
            .state
            .pager
            .subscribe(self.services.documents.as_ref(), patient_id)
            .await
        {
            Ok(outcome) => self.handle_snapshot(outcome),
            Err(e) => {
                tracing::error!(error = %e, "entries subscription failed");
                self.notifier.warn(MSG_HISTORY_FAILED);
            }
        }
        self.refresh_upcoming().await;
    }

    // Live listing

    fn handle_snapshot(&mut self, outcome: Option<SnapshotOutcome>) {
        if let Some(SnapshotOutcome::Failed(_)) = outcome {
            self.notifier.warn(MSG_HISTORY_FAILED);
        }
    }

    /// Applies pending session and listing changes without waiting.
    pub fn sync(&mut self) {
        self.sync_auth();
        let outcome = self.state.pager.poll();
        self.handle_snapshot(outcome);
    }

    /// Waits for the next snapshot of the live listing.
    pub async fn wait_for_entries(&mut self) -> bool {
        let outcome = self.state.pager.next_snapshot().await;
        let received = outcome.is_some();
        self.handle_snapshot(outcome);
        received
    }

    pub async fn load_more(&mut self) -> usize {
        match self
            .state
            .pager
            .load_more(self.services.documents.as_ref())
            .await
        {
            Ok(appended) => appended,
            Err(e) => {
                tracing::error!(error = %e, "loading older entries failed");
                self.notifier.warn(MSG_HISTORY_FAILED);
                0
            }
        }
    }

    pub async fn refresh_upcoming(&mut self) {
        self.state.upcoming = fetch_upcoming(
            self.services.documents.as_ref(),
            self.state.current_patient.as_ref(),
            Utc::now(),
        )
        .await;
    }

    // Catalogs

    pub async fn load_catalog(&mut self, kind: CatalogKind) -> CoreResult<()> {
        let rebuilt = self
            .state
            .catalogs
            .load(self.services.documents.as_ref(), kind)
            .await?;
        tracing::debug!(catalog = kind.collection(), selects = rebuilt.len(), "select options rebuilt");
        self.refresh_upcoming().await;
        Ok(())
    }

    pub async fn load_catalogs(&mut self) -> CoreResult<()> {
        for kind in CatalogKind::ALL {
            self.load_catalog(kind).await?;
        }
        Ok(())
    }

    /// Adds a catalog item and reloads every catalog. Blank names are ignored.
    pub async fn add_catalog_item(
        &mut self,
        kind: CatalogKind,
        name: &str,
        specialty: Option<&str>,
    ) -> Option<DocumentId> {
        if name.trim().is_empty() {
            return None;
        }
        match add_catalog_item(self.services.documents.as_ref(), kind, name, specialty).await {
            Ok(id) => {
                self.notifier.ok(MSG_CATALOG_ADDED);
                if let Err(e) = self.load_catalogs().await {
                    tracing::error!(error = %e, "catalog reload failed");
                }
                Some(id)
            }
            Err(e) => {
                tracing::error!(error = %e, "catalog item creation failed");
                self.notifier.error(MSG_CATALOG_FAILED);
                None
            }
        }
    }

    /// Specialty to prefill when `doctor_id` is picked in the appointment form.
    pub fn doctor_specialty_hint(&self, doctor_id: &str) -> Option<String> {
        let id = DocumentId::parse(doctor_id.trim()).ok()?;
        self.state.catalogs.specialty_for(&id).map(str::to_string)
    }

    // Writing

    pub async fn submit_appointment(
        &mut self,
        form: AppointmentForm,
        files: Vec<SelectedFile>,
        progress: &mut (dyn FnMut(FileProgress) + Send),
    ) -> Option<EntryReceipt> {
        if self.state.current_patient.is_none() {
            self.notifier.warn(MSG_SELECT_PATIENT);
            return None;
        }
        let draft = form.into_draft(&self.state.catalogs);
        self.submit(draft, files, progress).await
    }

    pub async fn submit_exam(
        &mut self,
        form: ExamForm,
        files: Vec<SelectedFile>,
        progress: &mut (dyn FnMut(FileProgress) + Send),
    ) -> Option<EntryReceipt> {
        if self.state.current_patient.is_none() {
            self.notifier.warn(MSG_SELECT_PATIENT);
            return None;
        }
        self.submit(form.into_draft(), files, progress).await
    }

    async fn submit(
        &mut self,
        draft: CoreResult<EntryDraft>,
        files: Vec<SelectedFile>,
        progress: &mut (dyn FnMut(FileProgress) + Send),
    ) -> Option<EntryReceipt> {
        let patient_id = self.state.current_patient.clone()?;
        let draft = match draft {
            Ok(draft) => draft,
            Err(CoreError::InvalidDateTime(value)) => {
                tracing::warn!(value = %value, "rejected entry date");
                self.notifier.warn(MSG_INVALID_DATE);
                return None;
            }
            Err(e) => {
                self.notifier.warn(e.to_string());
                return None;
            }
        };

        let mut percents = vec![0u8; files.len()];
        let receipt = {
            let mut on_progress = |p: FileProgress| {
                if let Some(slot) = percents.get_mut(p.index) {
                    *slot = p.percent;
                }
                progress(p);
            };
            EntryWriter::new(
                self.services.documents.as_ref(),
                self.services.objects.as_ref(),
                self.config.upload_policy(),
            )
            .create_entry(&patient_id, &draft, &files, &mut on_progress)
            .await
        };

        for rejection in receipt.rejections() {
            self.notifier.warn(rejection_message(rejection));
        }
        if receipt.has_upload_failures() {
            self.notifier.error(MSG_UPLOAD_FAILED);
        }

        match &receipt.written {
            Ok(()) => {
                self.notifier.ok(MSG_SAVED);
                self.state.uploads.clear();
                self.sync();
                self.refresh_upcoming().await;
            }
            Err(_) => {
                self.notifier.error(MSG_SAVE_FAILED);
                self.state.uploads = upload_rows(&files, &percents);
            }
        }
        Some(receipt)
    }

    // Admin

    pub async fn edit_entry(&mut self, entry_id: &DocumentId, edit: &EntryEdit) -> bool {
        let (Some(capability), Some(patient_id)) =
            (self.admin_capability(), self.state.current_patient.clone())
        else {
            self.notifier.error(MSG_EDIT_FAILED);
            return false;
        };
        let result = AdminEditor::new(
            self.services.documents.as_ref(),
            self.services.objects.as_ref(),
        )
        .edit_entry(&capability, &patient_id, entry_id, edit)
        .await;
        self.finish_admin(result.map(|_| ()), MSG_EDITED, MSG_EDIT_FAILED)
            .await
    }

    pub async fn delete_attachment(&mut self, entry_id: &DocumentId, object: &ObjectPath) -> bool {
        let (Some(capability), Some(patient_id)) =
            (self.admin_capability(), self.state.current_patient.clone())
        else {
            self.notifier.error(MSG_ATTACHMENT_DELETE_FAILED);
            return false;
        };
        let result = AdminEditor::new(
            self.services.documents.as_ref(),
            self.services.objects.as_ref(),
        )
        .delete_attachment(&capability, &patient_id, entry_id, object)
        .await;
        self.finish_admin(result, MSG_ATTACHMENT_DELETED, MSG_ATTACHMENT_DELETE_FAILED)
            .await
    }

    pub async fn delete_entry(&mut self, entry_id: &DocumentId) -> bool {
        let (Some(capability), Some(patient_id)) =
            (self.admin_capability(), self.state.current_patient.clone())
        else {
            self.notifier.error(MSG_ENTRY_DELETE_FAILED);
            return false;
        };
        let result = AdminEditor::new(
            self.services.documents.as_ref(),
            self.services.objects.as_ref(),
        )
        .delete_entry(&capability, &patient_id, entry_id)
        .await;
        self.finish_admin(result.map(|_| ()), MSG_ENTRY_DELETED, MSG_ENTRY_DELETE_FAILED)
            .await
    }

    async fn finish_admin(&mut self, result: CoreResult<()>, ok: &str, failed: &str) -> bool {
        match result {
            Ok(()) => {
                self.notifier.ok(ok);
                self.sync();
                self.refresh_upcoming().await;
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "admin action failed");
                self.notifier.error(failed);
                false
            }
        }
    }

    // Views

    pub fn entry_list(&self) -> EntryListView {
        entry_list(
            self.state.pager.entries(),
            &self.state.catalogs,
            self.state.is_admin,
            self.state.pager.can_load_more(),
        )
    }

    /// Detail of a loaded entry, optionally focused on one attachment.
    pub fn entry_detail(&self, entry_id: &DocumentId, focus: Option<usize>) -> Option<EntryDetailView> {
        let entry = self.state.pager.find(entry_id)?;
        Some(entry_detail(
            entry,
            &self.state.catalogs,
            self.state.is_admin,
            focus,
        ))
    }

    pub fn upcoming_panel(&self) -> UpcomingPanelView {
        upcoming_panel(&self.state.upcoming, &self.state.catalogs)
    }

    pub fn session(&self) -> SessionView {
        session_view(self.state.principal.as_ref(), self.config.access_policy())
    }

    pub fn patient_options(&self) -> Vec<SelectOption> {
        self.state.patients.options()
    }

    pub fn select_options(&self, binding: SelectBinding) -> Vec<SelectOption> {
        self.state.catalogs.options(binding)
    }

    pub fn upload_rows(&self) -> &[UploadRowView] {
        &self.state.uploads
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifier.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::constants::SCHEDULED_STATUS;
    use crate::identity::{AccessPolicy, StaticIdentity};
    use crate::notify::NotificationKind;
    use crate::store::{AccessRules, MemoryDocumentStore};
    use crate::upcoming::upcoming_index;
    use crate::view::UpcomingPanelView;
    use chrono::Duration;
    use clinic_files::{MemoryObjectStore, UploadPolicy, DEFAULT_MAX_UPLOAD_BYTES};
    use clinic_types::EmailAddress;

    const ADMIN: &str = "admin@clinic.org";

    struct Harness {
        app: App,
        documents: Arc<MemoryDocumentStore>,
        objects: Arc<MemoryObjectStore>,
    }

    async fn harness(identity: StaticIdentity) -> Harness {
        let admins = vec![EmailAddress::parse(ADMIN).unwrap()];
        let documents = Arc::new(MemoryDocumentStore::with_rules(AccessRules::AdminWrites {
            policy: AccessPolicy::new(admins.clone()),
            session: identity.session(),
        }));
        documents.add_index(upcoming_index()).await;
        let objects = Arc::new(MemoryObjectStore::new());

        let config = CoreConfig::new(
            BackendConfig::new("clinic-test", None, None).unwrap(),
            admins,
            UploadPolicy::default(),
        )
        .unwrap();
        let services = Services {
            documents: documents.clone(),
            objects: objects.clone(),
            identity: Arc::new(identity),
        };
        Harness {
            app: App::new(config, services),
            documents,
            objects,
        }
    }

    fn as_user(email: &str) -> StaticIdentity {
        StaticIdentity::with_email(EmailAddress::parse(email).unwrap())
    }

    fn messages(app: &mut App) -> Vec<(NotificationKind, String)> {
        app.take_notifications()
            .into_iter()
            .map(|n| (n.kind, n.message))
            .collect()
    }

    fn tomorrow() -> String {
        (Utc::now() + Duration::days(1)).to_rfc3339()
    }

    fn noop() -> impl FnMut(FileProgress) + Send {
        |_| {}
    }

    #[tokio::test]
    async fn test_admin_records_appointment_with_image() {
        let mut h = harness(as_user(ADMIN)).await;
        h.app.sign_in().await;
        h.app.init().await;
        assert!(h.app.session().is_admin);

        let patient = h.app.add_patient("Ana").await.unwrap();
        assert_eq!(h.app.state().current_patient.as_ref(), Some(&patient));

        let form = AppointmentForm {
            date_time: tomorrow(),
            status: SCHEDULED_STATUS.into(),
            summary: "Revisión".into(),
            ..AppointmentForm::default()
        };
        let files = vec![SelectedFile::new("rx.png", "image/png", vec![7; 64])];
        let receipt = h
            .app
            .submit_appointment(form, files, &mut noop())
            .await
            .unwrap();
        assert!(receipt.written.is_ok());

        let list = h.app.entry_list();
        assert_eq!(list.rows.len(), 1);
        assert_eq!(list.rows[0].kind_label, "Cita");
        assert_eq!(list.rows[0].chips.len(), 1);
        assert!(list.rows[0].chips[0].label.starts_with("IMG"));
        assert!(list.rows[0].can_edit);

        let UpcomingPanelView::Items(items) = h.app.upcoming_panel() else {
            panic!("expected upcoming items");
        };
        assert_eq!(items.len(), 1);

        let notes = messages(&mut h.app);
        assert!(notes.contains(&(NotificationKind::Ok, MSG_PATIENT_CREATED.into())));
        assert!(notes.contains(&(NotificationKind::Ok, MSG_SAVED.into())));
        assert_eq!(h.objects.len().await, 1);
    }

    #[tokio::test]
    async fn test_oversized_file_is_skipped_and_entry_saved() {
        let mut h = harness(as_user(ADMIN)).await;
        h.app.sign_in().await;
        h.app.add_patient("Ana").await.unwrap();
        messages(&mut h.app);

        let big = SelectedFile::new(
            "big.pdf",
            "application/pdf",
            vec![0; (DEFAULT_MAX_UPLOAD_BYTES + 5 * MIB) as usize],
        );
        let form = ExamForm {
            date_time: "2025-03-01T09:30".into(),
            comment: "Analítica".into(),
            ..ExamForm::default()
        };
        let receipt = h.app.submit_exam(form, vec![big], &mut noop()).await.unwrap();

        assert!(receipt.written.is_ok());
        assert_eq!(receipt.attachments().count(), 0);
        let notes = messages(&mut h.app);
        assert_eq!(
            notes,
            vec![
                (NotificationKind::Warn, "“big.pdf” supera 20MB".to_string()),
                (NotificationKind::Ok, MSG_SAVED.to_string()),
            ]
        );
        let list = h.app.entry_list();
        assert_eq!(list.rows.len(), 1);
        assert_eq!(list.rows[0].attachments_badge(), Some(crate::view::NO_ATTACHMENTS));
        assert!(h.objects.is_empty().await);
    }

    #[tokio::test]
    async fn test_non_admin_gets_no_controls_and_cannot_mutate() {
        let mut admin = harness(as_user(ADMIN)).await;
        admin.app.sign_in().await;
        let patient = admin.app.add_patient("Ana").await.unwrap();
        let form = ExamForm {
            date_time: "2025-03-01T09:30".into(),
            ..ExamForm::default()
        };
        let entry = admin
            .app
            .submit_exam(form, vec![], &mut noop())
            .await
            .unwrap()
            .entry_id;
        admin.app.sign_out().await;

        // A second viewer over the same backend, signed in as a regular user.
        let identity = as_user("visitor@clinic.org");
        identity.sign_in().await.unwrap();
        let config = admin.app.config().clone();
        let mut app = App::new(
            config,
            Services {
                documents: admin.documents.clone(),
                objects: admin.objects.clone(),
                identity: Arc::new(identity),
            },
        );
        app.init().await;
        assert_eq!(app.state().current_patient.as_ref(), Some(&patient));

        let session = app.session();
        assert!(!session.is_admin);
        assert!(!session.show_add_patient);
        assert_eq!(session.label, "Conectado: visitor@clinic.org");
        let list = app.entry_list();
        assert!(!list.rows[0].can_edit && !list.rows[0].can_delete);

        assert!(!app.edit_entry(&entry, &EntryEdit::default()).await);
        assert!(!app.delete_entry(&entry).await);
        assert_eq!(
            messages(&mut app),
            vec![
                (NotificationKind::Error, MSG_EDIT_FAILED.to_string()),
                (NotificationKind::Error, MSG_ENTRY_DELETE_FAILED.to_string()),
            ]
        );
        assert_eq!(app.entry_list().rows.len(), 1);
    }

    #[tokio::test]
    async fn test_backend_refusal_reported_when_client_believes_admin() {
        let admins = vec![EmailAddress::parse(ADMIN).unwrap()];
        let identity = as_user(ADMIN);
        let documents = Arc::new(MemoryDocumentStore::with_rules(AccessRules::AdminWrites {
            policy: AccessPolicy::new(vec![EmailAddress::parse("owner@clinic.org").unwrap()]),
            session: identity.session(),
        }));
        documents.add_index(upcoming_index()).await;
        let config = CoreConfig::new(
            BackendConfig::new("clinic-test", None, None).unwrap(),
            admins,
            UploadPolicy::default(),
        )
        .unwrap();
        let mut app = App::new(
            config,
            Services {
                documents: documents.clone(),
                objects: Arc::new(MemoryObjectStore::new()),
                identity: Arc::new(identity),
            },
        );
        app.sign_in().await;
        app.init().await;
        assert!(app.session().is_admin);

        app.add_patient("Ana").await.unwrap();
        let form = ExamForm {
            date_time: "2025-03-01T09:30".into(),
            ..ExamForm::default()
        };
        let entry = app
            .submit_exam(form, vec![], &mut noop())
            .await
            .unwrap()
            .entry_id;
        assert!(app.entry_list().rows[0].can_edit);
        messages(&mut app);

        let edit = EntryEdit {
            text: "cambio".into(),
            status: String::new(),
        };
        assert!(!app.edit_entry(&entry, &edit).await);
        assert!(!app.delete_entry(&entry).await);
        assert_eq!(
            messages(&mut app),
            vec![
                (NotificationKind::Error, MSG_EDIT_FAILED.to_string()),
                (NotificationKind::Error, MSG_ENTRY_DELETE_FAILED.to_string()),
            ]
        );
        assert_eq!(app.entry_list().rows.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_without_patient_or_with_bad_date() {
        let mut h = harness(as_user(ADMIN)).await;
        h.app.init().await;
        assert!(h
            .app
            .submit_exam(ExamForm::default(), vec![], &mut noop())
            .await
            .is_none());
        assert_eq!(
            messages(&mut h.app),
            vec![(NotificationKind::Warn, MSG_SELECT_PATIENT.to_string())]
        );

        h.app.add_patient("Luis").await.unwrap();
        messages(&mut h.app);
        let form = AppointmentForm {
            date_time: "mañana".into(),
            ..AppointmentForm::default()
        };
        assert!(h.app.submit_appointment(form, vec![], &mut noop()).await.is_none());
        assert_eq!(
            messages(&mut h.app),
            vec![(NotificationKind::Warn, MSG_INVALID_DATE.to_string())]
        );
        assert!(h.app.entry_list().rows.is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_still_saves_entry() {
        let mut h = harness(as_user(ADMIN)).await;
        h.app.add_patient("Ana").await.unwrap();
        messages(&mut h.app);
        h.objects.fail_uploads_named("scan.png").await;

        let form = ExamForm {
            date_time: "2025-03-01T09:30".into(),
            ..ExamForm::default()
        };
        let files = vec![SelectedFile::new("scan.png", "image/png", vec![1; 8])];
        h.app.submit_exam(form, files, &mut noop()).await.unwrap();

        assert_eq!(
            messages(&mut h.app),
            vec![
                (NotificationKind::Error, MSG_UPLOAD_FAILED.to_string()),
                (NotificationKind::Ok, MSG_SAVED.to_string()),
            ]
        );
        assert_eq!(h.app.entry_list().rows.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_upload_rows() {
        let mut h = harness(as_user(ADMIN)).await;
        h.app.add_patient("Ana").await.unwrap();
        messages(&mut h.app);
        h.documents.set_unavailable(true).await;

        let form = ExamForm {
            date_time: "2025-03-01T09:30".into(),
            ..ExamForm::default()
        };
        let files = vec![SelectedFile::new("a.png", "image/png", vec![1; 8])];
        h.app.submit_exam(form, files, &mut noop()).await.unwrap();

        let notes = messages(&mut h.app);
        assert!(notes.contains(&(NotificationKind::Error, MSG_SAVE_FAILED.into())));
        assert_eq!(h.app.upload_rows().len(), 1);
        assert_eq!(h.app.upload_rows()[0].percent, 100);
    }

    #[tokio::test]
    async fn test_admin_delete_entry_updates_listing() {
        let mut h = harness(as_user(ADMIN)).await;
        h.app.sign_in().await;
        h.app.add_patient("Ana").await.unwrap();
        let form = ExamForm {
            date_time: "2025-03-01T09:30".into(),
            ..ExamForm::default()
        };
        let files = vec![SelectedFile::new("a.pdf", "application/pdf", vec![1; 8])];
        let id = h
            .app
            .submit_exam(form, files, &mut noop())
            .await
            .unwrap()
            .entry_id;
        messages(&mut h.app);

        assert!(h.app.delete_entry(&id).await);
        assert_eq!(
            messages(&mut h.app),
            vec![(NotificationKind::Ok, MSG_ENTRY_DELETED.to_string())]
        );
        assert!(h.app.entry_list().rows.is_empty());
        assert!(h.objects.is_empty().await);
    }

    #[tokio::test]
    async fn test_admin_edits_and_removes_attachment() {
        let mut h = harness(as_user(ADMIN)).await;
        h.app.sign_in().await;
        h.app.add_patient("Ana").await.unwrap();
        let form = AppointmentForm {
            date_time: tomorrow(),
            ..AppointmentForm::default()
        };
        let files = vec![SelectedFile::new("a.png", "image/png", vec![1; 8])];
        let receipt = h
            .app
            .submit_appointment(form, files, &mut noop())
            .await
            .unwrap();
        let object = receipt.attachments().next().unwrap().path.clone();
        messages(&mut h.app);

        let edit = EntryEdit {
            text: "Todo bien".into(),
            status: "realizada".into(),
        };
        assert!(h.app.edit_entry(&receipt.entry_id, &edit).await);
        assert!(h.app.delete_attachment(&receipt.entry_id, &object).await);

        let detail = h.app.entry_detail(&receipt.entry_id, None).unwrap();
        assert_eq!(detail.text, "Todo bien");
        assert!(detail.attachments.is_empty());
        // No longer scheduled, so it leaves the upcoming panel.
        assert_eq!(h.app.upcoming_panel(), UpcomingPanelView::Empty);
        assert_eq!(
            messages(&mut h.app),
            vec![
                (NotificationKind::Ok, MSG_EDITED.to_string()),
                (NotificationKind::Ok, MSG_ATTACHMENT_DELETED.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_for_entries_sees_external_write() {
        let mut h = harness(as_user(ADMIN)).await;
        let patient = h.app.add_patient("Ana").await.unwrap();
        assert!(h.app.entry_list().rows.is_empty());

        let draft = ExamForm {
            date_time: "2025-03-01T09:30".into(),
            ..ExamForm::default()
        }
        .into_draft()
        .unwrap();
        let policy = UploadPolicy::default();
        EntryWriter::new(h.documents.as_ref(), h.objects.as_ref(), &policy)
            .create_entry(&patient, &draft, &[], &mut |_| {})
            .await;

        assert!(h.app.wait_for_entries().await);
        assert_eq!(h.app.entry_list().rows.len(), 1);
    }

    #[tokio::test]
    async fn test_load_more_through_controller() {
        let h = harness(as_user(ADMIN)).await;
        let mut app = h.app.with_page_size(2);
        app.add_patient("Ana").await.unwrap();
        for day in 1..=3 {
            let form = ExamForm {
                date_time: format!("2025-03-0{}T09:30", day),
                ..ExamForm::default()
            };
            app.submit_exam(form, vec![], &mut noop()).await.unwrap();
        }

        let list = app.entry_list();
        assert_eq!(list.rows.len(), 2);
        assert!(list.load_more_enabled);

        assert_eq!(app.load_more().await, 1);
        let list = app.entry_list();
        assert_eq!(list.rows.len(), 3);
        assert!(!list.load_more_enabled);
        assert_eq!(app.load_more().await, 0);
    }

    #[tokio::test]
    async fn test_catalogs_feed_selects_and_specialty_hint() {
        let mut h = harness(as_user(ADMIN)).await;
        h.app.init().await;
        let doctor = h
            .app
            .add_catalog_item(CatalogKind::Doctor, "Dra. Ruiz", Some("Pediatría"))
            .await
            .unwrap();
        assert!(h.app.add_catalog_item(CatalogKind::Clinic, "  ", None).await.is_none());

        let options = h.app.select_options(SelectBinding::AppointmentDoctor);
        assert_eq!(options.len(), 2);
        assert_eq!(options[1].label, "Dra. Ruiz · Pediatría");
        assert_eq!(
            h.app.doctor_specialty_hint(&doctor.to_string()).as_deref(),
            Some("Pediatría")
        );
        assert_eq!(h.app.doctor_specialty_hint("not-an-id"), None);
        assert_eq!(
            messages(&mut h.app),
            vec![(NotificationKind::Ok, MSG_CATALOG_ADDED.to_string())]
        );
    }

    #[tokio::test]
    async fn test_listener_failure_warns() {
        let mut h = harness(as_user(ADMIN)).await;
        h.app.add_patient("Ana").await.unwrap();
        messages(&mut h.app);

        h.documents
            .break_listeners(crate::store::StoreError::PermissionDenied("rules".into()))
            .await;
        h.app.sync();
        assert_eq!(
            messages(&mut h.app),
            vec![(NotificationKind::Warn, MSG_HISTORY_FAILED.to_string())]
        );
    }

    #[tokio::test]
    async fn test_sign_in_failure_and_sign_out() {
        let mut h = harness(StaticIdentity::unavailable()).await;
        h.app.toggle_session().await;
        assert!(h.app.state().principal.is_none());
        assert_eq!(
            messages(&mut h.app),
            vec![(NotificationKind::Error, MSG_SIGN_IN_FAILED.to_string())]
        );

        let mut h = harness(as_user(ADMIN)).await;
        h.app.toggle_session().await;
        assert_eq!(h.app.session().label, format!("Admin: {}", ADMIN));
        h.app.toggle_session().await;
        assert!(!h.app.session().is_admin);
        assert_eq!(
            messages(&mut h.app),
            vec![(NotificationKind::Info, MSG_SIGNED_OUT.to_string())]
        );
    }

    #[test]
    fn test_rejection_messages() {
        let too_large = Rejection::TooLarge {
            name: "scan.pdf".into(),
            size: 30 * MIB,
            limit: 20 * MIB,
        };
        assert_eq!(rejection_message(&too_large), "“scan.pdf” supera 20MB");
        let odd = Rejection::TooLarge {
            name: "a".into(),
            size: 10,
            limit: MIB + MIB / 2,
        };
        assert_eq!(rejection_message(&odd), "“a” supera 1.50MB");
        let disallowed = Rejection::DisallowedType {
            name: "a.gif".into(),
            content_type: "image/gif".into(),
        };
        assert_eq!(rejection_message(&disallowed), "Tipo no permitido: image/gif");
    }
}
