use crate::args::ReceiptArgs;
use crate::commands::{maybe_save, Out, ParseOutput};
use crate::error::{ErrorType, IntoResult};
use crate::pipeline::{ImageFormat, ImageInput, Pipeline, PipelineError, PipelineInput, Stage};
use crate::{utils, Config, Result};
use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use tracing::debug;

/// Reads the receipt image at `args.path()` and runs the image pipeline on it. The MIME type
/// comes from `--mime-type` or, failing that, the file extension.
pub async fn receipt(
    config: &Config,
    pipeline: &Pipeline,
    args: &ReceiptArgs,
    today: NaiveDate,
) -> Result<Out<ParseOutput>> {
    let path = args.path();
    let mime_type = match args.mime_type() {
        Some(m) => m.to_string(),
        None => path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageFormat::from_extension)
            .map(|f| f.mime_type().to_string())
            .ok_or_else(|| {
                anyhow!(
                    "Unable to tell the image type of '{}', pass --mime-type",
                    path.display()
                )
            })
            .pub_result(ErrorType::Request)?,
    };
    let bytes = utils::read_bytes(path)
        .await
        .context("Unable to read the receipt image")
        .pub_result(ErrorType::Io)?;
    debug!("Read {} bytes of {mime_type} from {}", bytes.len(), path.display());

    let image = ImageInput::with_limit(bytes, &mime_type, config.max_image_bytes())
        .map_err(|e| PipelineError::new(Stage::Ocr, e))
        .pub_result(ErrorType::Pipeline)?;
    let record = pipeline
        .run(PipelineInput::Image(image), args.date().unwrap_or(today))
        .await
        .pub_result(ErrorType::Pipeline)?;
    maybe_save(config, record, args.save()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_type, pipeline_error};
    use crate::pipeline::{StageError, VisionError};
    use crate::test::TestEnv;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[tokio::test]
    async fn test_receipt_from_png_file() {
        let env = TestEnv::new().await;
        let path = env.scratch().join("receipt.PNG");
        utils::write(&path, PNG).await.unwrap();
        env.llm()
            .push_response("TRADER JOE'S\n2/14\nTOTAL 23.17")
            .push_response(r#"{"amount": 23.17, "category": "grocery", "description": "Trader Joe's", "date": "2/14"}"#)
            .push_response(r#"{"amount": 23.17, "category": "Food", "description": "Trader Joe's", "date": "2026-02-14"}"#);

        let args = ReceiptArgs::new(&path, None, None, false);
        let out = receipt(&env.config(), &env.pipeline(), &args, TestEnv::today())
            .await
            .unwrap();
        assert_eq!(
            out.structure().unwrap().record.date(),
            NaiveDate::from_ymd_opt(2026, 2, 14).unwrap()
        );
        let requests = env.llm().requests();
        assert_eq!(requests[0].image.as_ref().unwrap().mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_mismatched_mime_type_fails_before_any_call() {
        let env = TestEnv::new().await;
        let path = env.scratch().join("receipt.jpg");
        utils::write(&path, PNG).await.unwrap();
        let args = ReceiptArgs::new(&path, None, None, false);
        let e = receipt(&env.config(), &env.pipeline(), &args, TestEnv::today())
            .await
            .unwrap_err();
        let pipeline_error = pipeline_error(&e).unwrap();
        assert_eq!(pipeline_error.stage, Stage::Ocr);
        assert_eq!(
            pipeline_error.cause,
            StageError::Vision(VisionError::ContentMismatch("image/jpeg".to_string()))
        );
        assert_eq!(env.llm().call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_extension_and_missing_file() {
        let env = TestEnv::new().await;
        let args = ReceiptArgs::new(env.scratch().join("receipt.pdf"), None, None, false);
        let e = receipt(&env.config(), &env.pipeline(), &args, TestEnv::today())
            .await
            .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Request));

        let args = ReceiptArgs::new(env.scratch().join("missing.png"), None, None, false);
        let e = receipt(&env.config(), &env.pipeline(), &args, TestEnv::today())
            .await
            .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Io));
    }
}
