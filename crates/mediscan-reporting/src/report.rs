//! 诊断报告渲染
//!
//! `ReportView` 汇集报告所需的全部文本，HTML 与 PDF 共用同一视图。

use mediscan_core::{Analysis, Diagnosis, MediscanError, Patient, Result, Settings};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use serde::Serialize;
use std::io::BufWriter;
use std::str::FromStr;
use tera::{Context, Tera};

pub const FACILITY_TAGLINE: &str = "Advanced AI Lung Disease Analysis & Research Facility";
pub const REFERRER: &str = "Self-requested AI Screening";
pub const FIGURE_CAPTION: &str = "FIG 1.0: ANTEROPOSTERIOR (AP) CHEST PROJECTION";
pub const SIGNATURE_CAPTION: &str = "Medical Officer Signature";
pub const DISCLAIMER: &str = "Disclaimer: This is an AI-generated screening report. It should not be used as the sole basis for surgical or medical decisions. Always consult with a certified Pulmonary Specialist.";

/// `.html` 后缀使 tera 对变量启用自动转义
const REPORT_TEMPLATE_NAME: &str = "report.html";
const REPORT_TEMPLATE: &str = include_str!("../templates/report.html");

const OBSERVATION_NORMAL: &str = "no significant pathological opacities in the lung fields. Diaphragmatic contours appear crisp. Mediastinal shadow within normal limits.";
const OBSERVATION_SUFFIX: &str = " Correlation with clinical symptoms and further laboratory tests (e.g., CT scan, PCR) is advised for definitive diagnosis.";

/// 报告输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Html,
    Pdf,
}

impl FromStr for ReportFormat {
    type Err = MediscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "pdf" => Ok(Self::Pdf),
            other => Err(MediscanError::validation(format!(
                "Unsupported report format '{}': expected html or pdf",
                other
            ))),
        }
    }
}

/// 观察描述
pub fn observation_text(diagnosis: Diagnosis) -> String {
    let finding = match diagnosis {
        Diagnosis::Normal => OBSERVATION_NORMAL.to_string(),
        other => format!("findings highly suggestive of {} patterns.", other),
    };
    format!(
        "Neural Network analysis of the submitted radiograph shows {}{}",
        finding, OBSERVATION_SUFFIX
    )
}

/// 置信度分项
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreLine {
    pub label: String,
    pub percent: String,
}

/// 报告视图
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub analysis_id: String,
    pub hospital_name: String,
    pub hospital_address: String,
    pub hospital_phone: String,
    pub registration_number: String,
    pub patient_name: String,
    pub patient_code: String,
    pub age_gender: String,
    pub contact: String,
    pub date: String,
    pub image_url: String,
    pub diagnosis: String,
    pub is_normal: bool,
    pub confidence: String,
    pub observation: String,
    pub breakdown: Vec<ScoreLine>,
    pub doctor_notes: String,
    pub recommendations: String,
    pub approval_status: String,
    pub reviewed_by: String,
    pub reporting_doctor: String,
}

impl ReportView {
    pub fn build(analysis: &Analysis, patient: &Patient, settings: &Settings) -> Self {
        let meta = &analysis.report_metadata;
        let recommendations = if analysis.recommendations.trim().is_empty() {
            settings
                .default_recommendation(analysis.diagnosis)
                .unwrap_or_default()
                .to_string()
        } else {
            analysis.recommendations.clone()
        };

        Self {
            analysis_id: analysis.analysis_id.clone(),
            hospital_name: meta.hospital_name.clone(),
            hospital_address: meta.hospital_address.clone(),
            hospital_phone: meta.hospital_phone.clone(),
            registration_number: meta.registration_number.clone(),
            patient_name: patient.details.full_name.clone(),
            patient_code: patient.patient_id.clone(),
            age_gender: format!("{}Y / {}", patient.details.age, patient.details.gender.as_str()),
            contact: patient.details.phone_number.clone(),
            date: analysis.analysis_date.format("%d %b %Y, %H:%M").to_string(),
            image_url: analysis.image_url.clone(),
            diagnosis: analysis.diagnosis.to_string(),
            is_normal: !analysis.diagnosis.is_positive(),
            confidence: format!("{:.2}%", analysis.primary_confidence * 100.0),
            observation: observation_text(analysis.diagnosis),
            breakdown: analysis
                .confidence_scores
                .entries()
                .iter()
                .map(|(d, score)| ScoreLine {
                    label: d.to_string(),
                    percent: format!("{:.1}%", score * 100.0),
                })
                .collect(),
            doctor_notes: analysis.doctor_notes.clone(),
            recommendations,
            approval_status: analysis.approval_status.as_str().to_string(),
            reviewed_by: analysis.reviewed_by.clone(),
            reporting_doctor: meta.reporting_doctor.clone(),
        }
    }

    /// 以 tera 模板渲染 HTML，变量默认转义
    pub fn render_html(&self) -> Result<String> {
        let mut tera = Tera::default();
        tera.add_raw_template(REPORT_TEMPLATE_NAME, REPORT_TEMPLATE)
            .map_err(template_error)?;

        let mut context = Context::from_serialize(self).map_err(template_error)?;
        context.insert("tagline", FACILITY_TAGLINE);
        context.insert("referrer", REFERRER);
        context.insert("figureCaption", FIGURE_CAPTION);
        context.insert("signatureCaption", SIGNATURE_CAPTION);
        context.insert("disclaimer", DISCLAIMER);

        tera.render(REPORT_TEMPLATE_NAME, &context)
            .map_err(template_error)
    }

    pub fn render_pdf(&self) -> Result<Vec<u8>> {
        let title = format!("MediScan Report {}", self.analysis_id);
        let mut page = PdfPage::new(&title)?;

        page.line(&self.hospital_name, 16.0, true);
        page.line(FACILITY_TAGLINE, 10.0, false);
        page.line(&self.hospital_address, 9.0, false);
        page.line(
            &format!("Tel: {} | Reg. No: {}", self.hospital_phone, self.registration_number),
            9.0,
            false,
        );
        page.gap(6.0);

        page.line("PATIENT DETAILS", 11.0, true);
        page.line(&format!("Name: {}", self.patient_name), 10.0, false);
        page.line(&format!("Patient ID: {}", self.patient_code), 10.0, false);
        page.line(&format!("Age/Gender: {}", self.age_gender), 10.0, false);
        page.line(&format!("Contact: {}", self.contact), 10.0, false);
        page.gap(4.0);

        page.line("ANALYSIS SUMMARY", 11.0, true);
        page.line(&format!("Report ID: {}", self.analysis_id), 10.0, false);
        page.line(&format!("Date: {}", self.date), 10.0, false);
        page.line(&format!("Referrer: {}", REFERRER), 10.0, false);
        page.line(&format!("Image: {}", self.image_url), 9.0, false);
        page.line(FIGURE_CAPTION, 8.0, false);
        page.gap(4.0);

        page.line("AI DIAGNOSTIC FINDINGS", 11.0, true);
        page.line(&format!("Primary Classification: {}", self.diagnosis), 14.0, true);
        page.line(&format!("Confidence Score: {}", self.confidence), 10.0, false);
        page.gap(4.0);

        page.line("OBSERVATIONS", 11.0, true);
        page.paragraph(&self.observation, 9.0);
        page.gap(4.0);

        page.line("AI CONFIDENCE BREAKDOWN", 11.0, true);
        for line in &self.breakdown {
            page.line(&format!("  {}: {}", line.label, line.percent), 10.0, false);
        }

        if !self.doctor_notes.trim().is_empty() {
            page.gap(4.0);
            page.line("DOCTOR NOTES", 11.0, true);
            page.paragraph(&self.doctor_notes, 9.0);
        }
        if !self.recommendations.trim().is_empty() {
            page.gap(4.0);
            page.line("RECOMMENDATIONS", 11.0, true);
            page.paragraph(&self.recommendations, 9.0);
        }

        page.gap(12.0);
        page.line(&self.reporting_doctor, 11.0, true);
        page.line(SIGNATURE_CAPTION, 8.0, false);
        page.gap(4.0);
        page.paragraph(DISCLAIMER, 7.0);

        page.finish()
    }
}

fn template_error(e: tera::Error) -> MediscanError {
    MediscanError::Internal(format!("Report template error: {}", e))
}

/// 内置字体只覆盖 ASCII
fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 20.0;
const LEFT: f32 = 20.0;

fn pdf_error(e: impl std::fmt::Display) -> MediscanError {
    MediscanError::Internal(format!("PDF generation error: {}", e))
}

/// A4 逐行排版，写满后自动换页
struct PdfPage {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl PdfPage {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?;
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: TOP,
        })
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        let height = size * 0.5 + 1.5;
        if self.y - height < BOTTOM {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP;
        }
        let font = if bold { &self.bold } else { &self.regular };
        self.layer
            .use_text(pdf_safe(text), size, Mm(LEFT), Mm(self.y), font);
        self.y -= height;
    }

    fn paragraph(&mut self, text: &str, size: f32) {
        let width = (900.0 / size) as usize;
        for line in wrap_text(text, width) {
            self.line(&line, size, false);
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn finish(self) -> Result<Vec<u8>> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc.save(&mut buf).map_err(pdf_error)?;
        buf.into_inner().map_err(pdf_error)
    }
}
