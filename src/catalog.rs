//! Activity catalog - the immutable, ordered route definition
//!
//! An `ActivityCatalog` is static configuration: it is built once,
//! validated, and never mutated at runtime. Activity ids define a total
//! order, and the unlock rule is strictly positional (an activity
//! unlocks when its predecessor in the catalog is completed).

use serde::{Deserialize, Serialize};

use crate::error::RouteError;

/// Program phase an activity belongs to. Purely informational grouping;
/// plays no part in unlock or completion math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Before,
    During,
    After,
}

/// One discrete, orderable step in the mobility program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Unique positive id; defines the total order within the catalog
    pub id: u32,
    pub title: String,
    pub phase: Phase,
    /// Whether this step counts toward route completion
    pub mandatory: bool,
    /// Opaque display string; not used in computation
    pub deadline: String,
    /// What the uploaded evidence artifact must contain
    pub document_required: String,
}

impl Activity {
    pub fn new(
        id: u32,
        title: impl Into<String>,
        phase: Phase,
        mandatory: bool,
        deadline: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            phase,
            mandatory,
            deadline: deadline.into(),
            document_required: String::new(),
        }
    }

    pub fn with_document(mut self, document_required: impl Into<String>) -> Self {
        self.document_required = document_required.into();
        self
    }
}

/// Immutable ordered list of activities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityCatalog {
    activities: Vec<Activity>,
}

impl ActivityCatalog {
    /// Build a catalog, validating that ids are positive, unique and
    /// strictly ascending.
    pub fn new(activities: Vec<Activity>) -> Result<Self, RouteError> {
        let mut last_id = 0u32;
        for activity in &activities {
            if activity.id == 0 {
                return Err(RouteError::InvalidCatalog(
                    "activity ids must be positive".into(),
                ));
            }
            if activity.id <= last_id {
                return Err(RouteError::InvalidCatalog(format!(
                    "activity ids must be strictly ascending: {} follows {}",
                    activity.id, last_id
                )));
            }
            last_id = activity.id;
        }
        Ok(Self { activities })
    }

    /// Look up an activity by id. Unknown ids fail fast; they are always
    /// a programming or configuration error.
    pub fn get(&self, id: u32) -> Result<&Activity, RouteError> {
        self.activities
            .iter()
            .find(|a| a.id == id)
            .ok_or(RouteError::UnknownActivity(id))
    }

    /// Position of an activity within the catalog order.
    pub fn position(&self, id: u32) -> Result<usize, RouteError> {
        self.activities
            .iter()
            .position(|a| a.id == id)
            .ok_or(RouteError::UnknownActivity(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Activity> {
        self.activities.iter()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    /// The reference 24-step student route of the mobility program.
    pub fn student_route() -> Self {
        use Phase::*;
        let activities = vec![
            Activity::new(1, "Revisión de requisitos de movilidad", Before, true, "15 Ene 2025")
                .with_document("Captura de pantalla confirmando la revisión de requisitos"),
            Activity::new(2, "Subir documentos", Before, true, "30 Ene 2025")
                .with_document("Pasaporte vigente, certificado de matrícula y carta de motivación en PDF"),
            Activity::new(3, "Firma de convenio de estudios", Before, true, "15 Feb 2025")
                .with_document("Convenio de estudios firmado digitalmente o escaneado en PDF"),
            Activity::new(4, "Aprobación del coordinador académico", Before, true, "28 Feb 2025")
                .with_document("Carta de aprobación del coordinador firmada"),
            Activity::new(5, "Asistencia a charla informativa", Before, true, "10 Mar 2025")
                .with_document("Certificado de asistencia a la charla"),
            Activity::new(6, "Revisión de seguro médico internacional", Before, true, "20 Mar 2025")
                .with_document("Copia de la póliza del seguro médico internacional"),
            Activity::new(7, "Gestión de visa / trámites migratorios", Before, true, "15 Abr 2025")
                .with_document("Visa de estudiante o comprobante del trámite"),
            Activity::new(8, "Compra de boletos", Before, true, "30 Abr 2025")
                .with_document("E-ticket o confirmación de reserva en PDF"),
            Activity::new(9, "Confirmación de alojamiento", Before, true, "10 May 2025")
                .with_document("Contrato o confirmación de reserva del alojamiento"),
            Activity::new(10, "Entrega de documentos finales", Before, true, "25 May 2025")
                .with_document("Paquete de documentos finales requerido por coordinación"),
            Activity::new(11, "Llegada al país destino", During, true, "Dentro de 24h de llegada")
                .with_document("Confirmación de llegada"),
            Activity::new(12, "Registro en la universidad receptora", During, true, "Primera semana")
                .with_document("Comprobante de registro en la universidad receptora"),
            Activity::new(13, "Entrega de documentos de llegada", During, true, "Primera semana")
                .with_document("Documentos de llegada sellados"),
            Activity::new(14, "Inicio de clases", During, true, "Según calendario")
                .with_document("Horario de clases confirmado"),
            Activity::new(15, "Seguimiento académico mensual", During, true, "Cada mes")
                .with_document("Reporte de seguimiento académico"),
            Activity::new(16, "Actividades culturales o integraciones", During, false, "Durante estancia")
                .with_document("Evidencia de participación"),
            Activity::new(17, "Reporte de situación", During, true, "Cada 2 meses")
                .with_document("Reporte de situación firmado"),
            Activity::new(18, "Contacto con tutor académico internacional", During, true, "Semanal")
                .with_document("Constancia de contacto con el tutor"),
            Activity::new(19, "Entrega de certificado de notas", After, true, "15 días post-retorno")
                .with_document("Certificado de notas oficial sellado (PDF)"),
            Activity::new(20, "Subir informe final de movilidad", After, true, "30 días post-retorno")
                .with_document("Informe final en formato PDF con fotos"),
            Activity::new(21, "Reunión de cierre con coordinación", After, true, "45 días post-retorno")
                .with_document("Acta de la reunión de cierre"),
            Activity::new(22, "Validación y homologación de materias", After, true, "60 días post-retorno")
                .with_document("Resolución de homologación de materias"),
            Activity::new(23, "Encuesta de satisfacción", After, true, "70 días post-retorno")
                .with_document("Comprobante de encuesta completada"),
            Activity::new(24, "Participación como embajador", After, false, "Voluntario")
                .with_document("Evidencia de participación como embajador"),
        ];
        // The reference route is well-formed by construction
        Self { activities }
    }
}
