use aws_sdk_s3::primitives::ByteStream;
use tracing::info;

use crate::errors::AppError;
use crate::report::generator::{render_markdown, InterviewReport};

pub fn report_key(user_id: &str, report: &InterviewReport) -> String {
    format!("reports/{}/{}.md", user_id, report.report_id)
}

/// Uploads the report as markdown and returns its object key.
pub async fn export_report(
    s3: &aws_sdk_s3::Client,
    s3_bucket: &str,
    user_id: &str,
    report: &InterviewReport,
) -> Result<String, AppError> {
    let key = report_key(user_id, report);
    s3.put_object()
        .bucket(s3_bucket)
        .key(&key)
        .body(ByteStream::from(render_markdown(report).into_bytes()))
        .content_type("text/markdown")
        .send()
        .await
        .map_err(|e| AppError::Storage(format!("report upload failed: {e}")))?;

    info!("Exported report to s3://{}/{}", s3_bucket, key);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::generator::{generate_interview_report, InterviewData};

    #[test]
    fn test_report_key_layout() {
        let report = generate_interview_report(&InterviewData::default());
        assert_eq!(
            report_key("alice", &report),
            format!("reports/alice/{}.md", report.report_id)
        );
    }
}
