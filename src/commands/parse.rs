use crate::args::ParseArgs;
use crate::commands::{maybe_save, Out, ParseOutput};
use crate::error::{ErrorType, IntoResult};
use crate::pipeline::{Pipeline, PipelineInput};
use crate::{Config, Result};
use anyhow::anyhow;
use chrono::NaiveDate;

/// Runs the text pipeline on `args.text()`. Relative dates are resolved against `args.date()`, or
/// `today` when no date was given. With `--save` the validated record is stored.
pub async fn parse(
    config: &Config,
    pipeline: &Pipeline,
    args: &ParseArgs,
    today: NaiveDate,
) -> Result<Out<ParseOutput>> {
    let text = args.text().trim();
    if text.is_empty() {
        return Err(anyhow!("Nothing to parse, the expense text is empty"))
            .pub_result(ErrorType::Request);
    }
    let reference_date = args.date().unwrap_or(today);
    let record = pipeline
        .run(PipelineInput::Text(text.to_string()), reference_date)
        .await
        .pub_result(ErrorType::Pipeline)?;
    maybe_save(config, record, args.save()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ExpenseFilter;
    use crate::error::{error_type, pipeline_error};
    use crate::pipeline::Stage;
    use crate::test::TestEnv;
    use crate::model::Category;

    const OLIVE_GARDEN: &str =
        r#"{"amount": 45.0, "category": "Food", "description": "Dinner at Olive Garden", "date": "2026-02-17"}"#;

    #[tokio::test]
    async fn test_parse_and_save() {
        let env = TestEnv::new().await;
        env.llm()
            .push_response(r#"{"amount": 45, "category": "dinner", "description": "Dinner at Olive Garden", "date": null}"#)
            .push_response(OLIVE_GARDEN);
        let args = ParseArgs::new("Dinner at Olive Garden forty-five dollars", None, true);

        let out = parse(&env.config(), &env.pipeline(), &args, TestEnv::today())
            .await
            .unwrap();
        let output = out.structure().unwrap();
        assert_eq!(output.record.category(), Category::Food);
        let saved = output.saved.as_ref().unwrap();
        assert_eq!(saved.owner, "default");
        assert!(out.message().starts_with("Saved $45.00 Food on 2026-02-17"));

        let listed = env
            .config()
            .db()
            .list_expenses(&ExpenseFilter::default())
            .await
            .unwrap();
        assert_eq!(listed, vec![saved.clone()]);
    }

    #[tokio::test]
    async fn test_parse_without_save_stores_nothing() {
        let env = TestEnv::new().await;
        env.llm().push_response(OLIVE_GARDEN).push_response(OLIVE_GARDEN);
        let args = ParseArgs::new("dinner 45", NaiveDate::from_ymd_opt(2026, 3, 1), false);
        let out = parse(&env.config(), &env.pipeline(), &args, TestEnv::today())
            .await
            .unwrap();
        assert!(out.structure().unwrap().saved.is_none());
        assert!(env.llm().requests()[1].user.contains("Today is 2026-03-01"));
        assert_eq!(env.config().db().count_expenses().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_failure_is_tagged() {
        let env = TestEnv::new().await;
        env.llm().push_response("no idea, sorry");
        let args = ParseArgs::new("dinner 45", None, true);
        let e = parse(&env.config(), &env.pipeline(), &args, TestEnv::today())
            .await
            .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Pipeline));
        assert_eq!(pipeline_error(&e).unwrap().stage, Stage::Extract);
        assert_eq!(env.config().db().count_expenses().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_text() {
        let env = TestEnv::new().await;
        let args = ParseArgs::new("   ", None, false);
        let e = parse(&env.config(), &env.pipeline(), &args, TestEnv::today())
            .await
            .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Request));
        assert_eq!(env.llm().call_count(), 0);
    }
}
