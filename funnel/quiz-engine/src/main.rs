use anyhow::Context;
use clap::Parser;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quiz_funnel::metrics::render_metrics;
use quiz_funnel::models::SubmitOutcome;
use quiz_funnel::services::quiz_flow::{QuizFlow, Step};
use quiz_funnel::{Config, FunnelState, QuizOpening};

type Input = Lines<BufReader<Stdin>>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Play a lead-capture quiz in the terminal", long_about = None)]
struct Args {
    /// Quiz identifier
    #[arg(short, long, default_value = "meta-furniture")]
    quiz: String,

    /// Language code (uk, ru, en, pl, de); anything else falls back to English
    #[arg(short, long, default_value = "en")]
    lang: String,

    /// Landing page URL to read UTM tags from
    #[arg(long)]
    landing_url: Option<String>,

    /// List available quizzes and exit
    #[arg(long)]
    list: bool,

    /// Print Prometheus metrics before exiting
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "quiz_funnel=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = Config::load().context("Failed to load configuration")?;
    let state = FunnelState::new(config)?;

    if args.list {
        for quiz in state.registry.summaries() {
            let languages: Vec<&str> = quiz.languages.iter().map(|l| l.as_str()).collect();
            println!(
                "{:<20} {:?}/{:<12} [{}]",
                quiz.id,
                quiz.platform,
                quiz.niche,
                languages.join(", ")
            );
        }
        return Ok(());
    }

    let opening = state
        .open_quiz(&args.quiz, &args.lang, args.landing_url.as_deref())
        .await;

    match opening {
        QuizOpening::NotFound { quiz_id } => println!("Quiz not found: {}", quiz_id),
        QuizOpening::Ready(flow) => {
            let mut input = BufReader::new(tokio::io::stdin()).lines();
            play(flow, &mut input).await?;
        }
    }

    if args.print_metrics {
        print!("{}", render_metrics()?);
    }

    Ok(())
}

async fn play(mut flow: QuizFlow, input: &mut Input) -> anyhow::Result<()> {
    let intro = flow.snapshot().await;
    let content = &intro.quiz().content;
    println!("\n{}\n{}", content.title, content.subtitle);
    if !content.bonus.is_empty() {
        println!("Bonus: {}", content.bonus);
    }
    if let Some(assignment) = flow.assignment() {
        tracing::debug!("Playing variant '{}'", assignment.variant_name);
    }

    loop {
        let state = flow.snapshot().await;
        match state.step() {
            Step::Question(_) => {
                let Some(question) = state.current_question() else {
                    break;
                };
                println!(
                    "\n[{}/{}] {}",
                    state.step_number(),
                    state.total_steps(),
                    question.question
                );
                for (n, option) in question.options.iter().enumerate() {
                    let marker = if state.selected() == Some(option.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    println!(" {}{}) {}", marker, n + 1, option);
                }

                let Some(line) = prompt(input, "Your choice").await? else {
                    return Ok(());
                };
                let answer = match line.parse::<usize>() {
                    Ok(n) if (1..=question.options.len()).contains(&n) => {
                        question.options[n - 1].clone()
                    }
                    _ => line,
                };

                if let Err(e) = flow.select_answer(&answer).await {
                    println!("{}", e);
                    continue;
                }
                flow.wait_for_advance().await?;
            }
            Step::Form => {
                println!(
                    "\n[{}/{}] Where should we send your results?",
                    state.step_number(),
                    state.total_steps()
                );
                let current = state.form().clone();

                let Some(name) = prompt_with_default(input, "Name", &current.name).await? else {
                    return Ok(());
                };
                let Some(phone) = prompt_with_default(input, "Phone", &current.phone).await? else {
                    return Ok(());
                };
                let Some(email) = prompt_with_default(
                    input,
                    "Email (optional)",
                    current.email.as_deref().unwrap_or_default(),
                )
                .await?
                else {
                    return Ok(());
                };
                let Some(telegram) = prompt_with_default(
                    input,
                    "Telegram (optional)",
                    current.telegram.as_deref().unwrap_or_default(),
                )
                .await?
                else {
                    return Ok(());
                };

                flow.update_form(|form| {
                    form.name = name;
                    form.phone = phone;
                    form.email = Some(email);
                    form.telegram = Some(telegram);
                })
                .await?;

                if !flow.can_submit().await {
                    println!("Name and phone are required.");
                    continue;
                }

                match flow.submit().await? {
                    SubmitOutcome::Submitted {
                        notice,
                        redirect_to,
                        redirect_after,
                    } => {
                        println!("{}", notice);
                        tokio::time::sleep(redirect_after).await;
                        println!("-> {}", redirect_to);
                    }
                    SubmitOutcome::Failed { message } => println!("{}", message),
                }
            }
            Step::Submitted => break,
        }
    }

    Ok(())
}

async fn prompt(input: &mut Input, label: &str) -> anyhow::Result<Option<String>> {
    print!("{}: ", label);
    std::io::stdout().flush()?;
    Ok(input.next_line().await?.map(|line| line.trim().to_string()))
}

async fn prompt_with_default(
    input: &mut Input,
    label: &str,
    current: &str,
) -> anyhow::Result<Option<String>> {
    let label = if current.is_empty() {
        label.to_string()
    } else {
        format!("{} [{}]", label, current)
    };
    Ok(prompt(input, &label)
        .await?
        .map(|line| if line.is_empty() { current.to_string() } else { line }))
}
