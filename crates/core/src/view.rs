//! View descriptions.
//!
//! Pure functions from application state to immutable values a front-end can
//! render. Nothing here touches the stores.

use crate::catalog::Catalogs;
use crate::constants::SUMMARY_PREVIEW_CHARS;
use crate::identity::{AccessPolicy, Principal};
use crate::model::{Attachment, CatalogKind, Entry, EntryKind};
use crate::upcoming::UpcomingOutcome;
use crate::writer::SelectedFile;
use chrono::{DateTime, Local, Utc};
use clinic_files::ObjectPath;
use clinic_uuid::DocumentId;

pub const NO_ATTACHMENTS: &str = "Sin adjuntos";
pub const UPCOMING_UNAVAILABLE: &str = "No se pudieron consultar próximas citas (revisar índices).";

/// Local date and time, or `-`.
pub fn fmt_date(value: Option<DateTime<Utc>>) -> String {
    match value {
        Some(dt) => dt.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string(),
        None => "-".into(),
    }
}

/// First `max_chars` characters, with `…` appended when something was cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

fn or_dash(text: String) -> String {
    if text.is_empty() {
        "-".into()
    } else {
        text
    }
}

fn size_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

/// Clickable attachment tag in a list row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipView {
    pub label: String,
    /// Opens the detail viewer focused on this attachment.
    pub attachment_index: usize,
}

impl ChipView {
    fn new(index: usize, attachment: &Attachment) -> Self {
        let tag = if attachment.is_image() { "IMG" } else { "PDF" };
        Self {
            label: format!("{} • {}", tag, attachment.name),
            attachment_index: index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRowView {
    pub id: DocumentId,
    pub kind: EntryKind,
    pub kind_label: &'static str,
    pub date: String,
    pub clinic: String,
    pub doctor: String,
    pub summary: String,
    pub companion: String,
    /// Appointments only.
    pub status: Option<String>,
    pub chips: Vec<ChipView>,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl EntryRowView {
    pub fn new(entry: &Entry, catalogs: &Catalogs, is_admin: bool) -> Self {
        Self {
            id: entry.id.clone(),
            kind: entry.kind(),
            kind_label: entry.kind().label(),
            date: fmt_date(Some(entry.date_time)),
            clinic: catalogs.name_of(CatalogKind::Clinic, entry.clinic_id.as_ref()),
            doctor: catalogs.doctor_label(entry),
            summary: or_dash(truncate_text(entry.text(), SUMMARY_PREVIEW_CHARS)),
            companion: catalogs.name_of(CatalogKind::Companion, entry.companion_id.as_ref()),
            status: entry.status().filter(|s| !s.is_empty()).map(str::to_string),
            chips: entry
                .attachments
                .iter()
                .enumerate()
                .map(|(i, a)| ChipView::new(i, a))
                .collect(),
            can_edit: is_admin,
            can_delete: is_admin,
        }
    }

    /// Badge shown instead of chips.
    pub fn attachments_badge(&self) -> Option<&'static str> {
        self.chips.is_empty().then_some(NO_ATTACHMENTS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryListView {
    pub rows: Vec<EntryRowView>,
    pub load_more_enabled: bool,
}

pub fn entry_list<'a>(
    entries: impl IntoIterator<Item = &'a Entry>,
    catalogs: &Catalogs,
    is_admin: bool,
    load_more_enabled: bool,
) -> EntryListView {
    EntryListView {
        rows: entries
            .into_iter()
            .map(|e| EntryRowView::new(e, catalogs, is_admin))
            .collect(),
        load_more_enabled,
    }
}

/// How an attachment is previewed in the detail viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Pdf,
    Image,
    /// "Sin visor para este tipo."
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentView {
    pub name: String,
    pub path: ObjectPath,
    /// `(content/type, 1.23 MB)`
    pub meta: String,
    pub url: String,
    pub embed: EmbedKind,
    pub can_delete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDetailView {
    pub id: DocumentId,
    pub date: String,
    pub kind_label: &'static str,
    pub clinic: String,
    pub doctor: String,
    pub companion: String,
    /// "Resumen" or "Comentario".
    pub text_label: &'static str,
    pub text: String,
    pub attachments: Vec<AttachmentView>,
    pub focus: Option<usize>,
    pub can_edit: bool,
    pub can_delete: bool,
}

pub fn entry_detail(
    entry: &Entry,
    catalogs: &Catalogs,
    is_admin: bool,
    focus: Option<usize>,
) -> EntryDetailView {
    let attachments = entry
        .attachments
        .iter()
        .map(|a| AttachmentView {
            name: a.name.clone(),
            path: a.path.clone(),
            meta: format!("({}, {})", a.content_type, size_mb(a.size)),
            url: a.url.clone(),
            embed: if a.is_pdf() {
                EmbedKind::Pdf
            } else if a.is_image() {
                EmbedKind::Image
            } else {
                EmbedKind::None
            },
            can_delete: is_admin,
        })
        .collect::<Vec<_>>();

    EntryDetailView {
        id: entry.id.clone(),
        date: fmt_date(Some(entry.date_time)),
        kind_label: entry.kind().label(),
        clinic: catalogs.name_of(CatalogKind::Clinic, entry.clinic_id.as_ref()),
        doctor: catalogs.doctor_label(entry),
        companion: catalogs.name_of(CatalogKind::Companion, entry.companion_id.as_ref()),
        text_label: match entry.kind() {
            EntryKind::Appointment => "Resumen",
            EntryKind::Exam => "Comentario",
        },
        text: or_dash(entry.text().to_string()),
        focus: focus.filter(|&i| i < attachments.len()),
        attachments,
        can_edit: is_admin,
        can_delete: is_admin,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingItemView {
    pub id: DocumentId,
    pub date: String,
    pub clinic: String,
    pub kind_label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpcomingPanelView {
    /// Plain empty state: no patient selected or nothing scheduled.
    Empty,
    /// The query could not run.
    Unavailable { message: &'static str },
    Items(Vec<UpcomingItemView>),
}

pub fn upcoming_panel(outcome: &UpcomingOutcome, catalogs: &Catalogs) -> UpcomingPanelView {
    match outcome {
        UpcomingOutcome::Unavailable(_) => UpcomingPanelView::Unavailable {
            message: UPCOMING_UNAVAILABLE,
        },
        UpcomingOutcome::Entries(entries) if !entries.is_empty() => UpcomingPanelView::Items(
            entries
                .iter()
                .map(|e| UpcomingItemView {
                    id: e.id.clone(),
                    date: fmt_date(Some(e.date_time)),
                    clinic: catalogs.name_of(CatalogKind::Clinic, e.clinic_id.as_ref()),
                    kind_label: EntryKind::Appointment.label(),
                })
                .collect(),
        ),
        _ => UpcomingPanelView::Empty,
    }
}

/// One line of the upload progress list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRowView {
    pub name: String,
    /// `1.23 MB · image/png`
    pub detail: String,
    pub percent: u8,
    pub is_image: bool,
}

pub fn upload_rows(files: &[SelectedFile], percents: &[u8]) -> Vec<UploadRowView> {
    files
        .iter()
        .enumerate()
        .map(|(i, f)| UploadRowView {
            name: f.name.clone(),
            detail: format!(
                "{} · {}",
                size_mb(f.size()),
                if f.content_type.is_empty() {
                    "tipo desconocido"
                } else {
                    &f.content_type
                }
            ),
            percent: percents.get(i).copied().unwrap_or(0),
            is_image: f.content_type.starts_with("image/"),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// `Admin: email`, `Conectado: email`, or empty.
    pub label: String,
    pub button_label: &'static str,
    pub is_admin: bool,
    pub show_add_patient: bool,
}

pub fn session_view(principal: Option<&Principal>, policy: &AccessPolicy) -> SessionView {
    let is_admin = policy.is_admin(principal);
    let label = match principal {
        Some(p) if is_admin => format!("Admin: {}", p.email()),
        Some(p) => format!("Conectado: {}", p.email()),
        None => String::new(),
    };
    SessionView {
        label,
        button_label: if principal.is_some() {
            "Cerrar sesión"
        } else {
            "Acceder como admin (Google)"
        },
        is_admin,
        show_add_patient: is_admin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CatalogItem, EntryDetails};
    use crate::store::StoreError;
    use chrono::TimeZone;
    use clinic_types::EmailAddress;

    fn attachment(name: &str, content_type: &str, size: u64) -> Attachment {
        Attachment {
            name: name.into(),
            path: ObjectPath::parse(&format!("patients/p/entries/e/{}", name)).unwrap(),
            content_type: content_type.into(),
            size,
            url: format!("memory://objects/{}", name),
            created_at: Utc::now(),
        }
    }

    fn entry(details: EntryDetails, attachments: Vec<Attachment>) -> Entry {
        Entry {
            id: DocumentId::parse("e1").unwrap(),
            date_time: Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap(),
            clinic_id: Some(DocumentId::parse("c1").unwrap()),
            doctor_id: Some(DocumentId::parse("d1").unwrap()),
            doctor_specialty: Some("Pediatría".into()),
            companion_id: None,
            details,
            attachments,
            created_at: None,
        }
    }

    #[test]
    fn test_truncate_counts_characters() {
        let long = "á".repeat(141);
        let cut = truncate_text(&long, 140);
        assert_eq!(cut.chars().count(), 141);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate_text(&"b".repeat(140), 140), "b".repeat(140));
    }

    #[test]
    fn test_row_for_appointment_with_image() {
        let e = entry(
            EntryDetails::Appointment {
                status: Some("programada".into()),
                summary: Some("Control".into()),
            },
            vec![attachment("rx.png", "image/png", 10)],
        );
        let row = EntryRowView::new(&e, &Catalogs::default(), false);

        assert_eq!(row.kind_label, "Cita");
        assert_eq!(row.status.as_deref(), Some("programada"));
        assert_eq!(row.clinic, "c1");
        assert_eq!(row.doctor, "Pediatría");
        assert_eq!(row.companion, "-");
        assert_eq!(row.chips[0].label, "IMG • rx.png");
        assert_eq!(row.attachments_badge(), None);
        assert!(!row.can_edit && !row.can_delete);
    }

    #[test]
    fn test_row_uses_catalog_names_once_loaded() {
        let mut catalogs = Catalogs::default();
        catalogs.replace(
            CatalogKind::Doctor,
            vec![CatalogItem {
                id: DocumentId::parse("d1").unwrap(),
                name: "Dra. Ruiz".into(),
                specialty: Some("Cardiología".into()),
            }],
        );
        let e = entry(EntryDetails::Exam { comment: None }, vec![]);
        let row = EntryRowView::new(&e, &catalogs, true);

        assert_eq!(row.doctor, "Dra. Ruiz · Cardiología");
        assert_eq!(row.summary, "-");
        assert_eq!(row.status, None);
        assert_eq!(row.attachments_badge(), Some(NO_ATTACHMENTS));
        assert!(row.can_edit && row.can_delete);
    }

    #[test]
    fn test_detail_embed_kinds_and_focus() {
        let e = entry(
            EntryDetails::Exam {
                comment: Some("ok".into()),
            },
            vec![
                attachment("a.pdf", "application/pdf", 1024 * 1024),
                attachment("b.webp", "image/webp", 1),
                attachment("c.txt", "text/plain", 1),
            ],
        );
        let detail = entry_detail(&e, &Catalogs::default(), false, Some(1));

        assert_eq!(detail.text_label, "Comentario");
        assert_eq!(detail.attachments[0].meta, "(application/pdf, 1.00 MB)");
        let embeds: Vec<EmbedKind> = detail.attachments.iter().map(|a| a.embed).collect();
        assert_eq!(embeds, vec![EmbedKind::Pdf, EmbedKind::Image, EmbedKind::None]);
        assert_eq!(detail.focus, Some(1));
        assert!(detail.attachments.iter().all(|a| !a.can_delete));

        assert_eq!(entry_detail(&e, &Catalogs::default(), false, Some(9)).focus, None);
    }

    #[test]
    fn test_upcoming_panel_states() {
        let catalogs = Catalogs::default();
        assert_eq!(
            upcoming_panel(&UpcomingOutcome::NoPatient, &catalogs),
            UpcomingPanelView::Empty
        );
        assert_eq!(
            upcoming_panel(&UpcomingOutcome::Entries(vec![]), &catalogs),
            UpcomingPanelView::Empty
        );
        assert_eq!(
            upcoming_panel(
                &UpcomingOutcome::Unavailable(StoreError::FailedPrecondition("index".into())),
                &catalogs
            ),
            UpcomingPanelView::Unavailable {
                message: UPCOMING_UNAVAILABLE
            }
        );

        let e = entry(
            EntryDetails::Appointment {
                status: Some("programada".into()),
                summary: None,
            },
            vec![],
        );
        let UpcomingPanelView::Items(items) =
            upcoming_panel(&UpcomingOutcome::Entries(vec![e]), &catalogs)
        else {
            panic!("expected items");
        };
        assert_eq!(items[0].kind_label, "Cita");
        assert_eq!(items[0].clinic, "c1");
    }

    #[test]
    fn test_upload_rows() {
        let files = vec![
            SelectedFile::new("a.png", "image/png", vec![0; 1024 * 1024 / 2]),
            SelectedFile::new("b", "", vec![]),
        ];
        let rows = upload_rows(&files, &[40]);
        assert_eq!(rows[0].detail, "0.50 MB · image/png");
        assert_eq!(rows[0].percent, 40);
        assert!(rows[0].is_image);
        assert_eq!(rows[1].detail, "0.00 MB · tipo desconocido");
        assert_eq!(rows[1].percent, 0);
    }

    #[test]
    fn test_session_labels() {
        let policy = AccessPolicy::new(vec![EmailAddress::parse("admin@clinic.org").unwrap()]);
        let admin = Principal::new(EmailAddress::parse("admin@clinic.org").unwrap(), None);
        let other = Principal::new(EmailAddress::parse("ana@clinic.org").unwrap(), None);

        let view = session_view(Some(&admin), &policy);
        assert_eq!(view.label, "Admin: admin@clinic.org");
        assert_eq!(view.button_label, "Cerrar sesión");
        assert!(view.show_add_patient);

        let view = session_view(Some(&other), &policy);
        assert_eq!(view.label, "Conectado: ana@clinic.org");
        assert!(!view.show_add_patient);

        let view = session_view(None, &policy);
        assert_eq!(view.label, "");
        assert_eq!(view.button_label, "Acceder como admin (Google)");
    }
}
