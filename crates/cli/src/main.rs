use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use club_agents::ClubAgent;
use club_core::{format_duration, ChatInput, CourseFilters, ReviewFilters, GREETING};
use club_observability::{init_tracing, AppMetrics};
use club_storage::{load_catalog_seed, Store};

#[derive(Debug, Parser)]
#[command(name = "club")]
#[command(about = "Motion Design Club CLI")]
struct Cli {
    #[arg(long, default_value = "data/catalog.json", env = "CLUB_CATALOG_PATH")]
    catalog: PathBuf,

    #[arg(long, env = "CLUB_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive FAQ chat.
    Chat,
    Ask {
        text: String,
    },
    Courses {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        published: bool,
    },
    Lessons {
        slug: String,
        #[arg(long)]
        lesson: Option<String>,
    },
    Reviews {
        #[command(subcommand)]
        command: ReviewsCommand,
    },
    Quote {
        course: String,
    },
}

#[derive(Debug, Subcommand)]
enum ReviewsCommand {
    List {
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        rating: Option<u8>,
        #[arg(long, default_value = "newest")]
        sort: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    Summary {
        course_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("club_cli");
    let cli = Cli::parse();

    let agent = build_agent(&cli.catalog, cli.database_url.as_deref()).await?;

    match cli.command {
        Command::Chat => run_chat(&agent)?,
        Command::Ask { text } => {
            let reply = agent.handle_chat(ChatInput { text });
            println!("{}", reply.reply_text);
        }
        Command::Courses {
            category,
            search,
            limit,
            published,
        } => {
            let courses = if published {
                agent.published_courses().await?
            } else {
                agent
                    .list_courses(CourseFilters {
                        category,
                        search_query: search,
                        limit,
                    })
                    .await?
            };
            println!("{}", serde_json::to_string_pretty(&courses)?);
        }
        Command::Lessons { slug, lesson } => match lesson {
            Some(lesson_id) => {
                let page = agent
                    .lesson_page(&slug, &lesson_id)
                    .await?
                    .with_context(|| format!("no lesson {lesson_id} in course {slug}"))?;
                println!("{}", serde_json::to_string_pretty(&page)?);
            }
            None => {
                let lessons = agent
                    .course_lessons(&slug)
                    .await?
                    .with_context(|| format!("no published course with slug {slug}"))?;
                for lesson in lessons {
                    println!(
                        "{:>2}. {} ({}){}",
                        lesson.order,
                        lesson.title,
                        format_duration(lesson.duration_seconds),
                        if lesson.is_free { " [free]" } else { "" }
                    );
                }
            }
        },
        Command::Reviews { command } => match command {
            ReviewsCommand::List {
                course,
                rating,
                sort,
                limit,
            } => {
                let reviews = agent
                    .reviews(ReviewFilters {
                        rating,
                        course_id: course,
                        sort_by: Some(sort),
                        limit,
                    })
                    .await?;
                println!("{}", serde_json::to_string_pretty(&reviews)?);
            }
            ReviewsCommand::Summary { course_id } => {
                let summary = agent.rating_summary(&course_id).await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        },
        Command::Quote { course } => {
            let quote = agent.checkout_quote(&course).await?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
        }
    }

    Ok(())
}

fn run_chat(agent: &ClubAgent<Store>) -> Result<()> {
    println!("{GREETING} type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        let reply = agent.handle_chat(ChatInput {
            text: message.to_string(),
        });
        println!("\n{}\n", reply.reply_text);
    }

    Ok(())
}

async fn build_agent(catalog: &Path, database_url: Option<&str>) -> Result<ClubAgent<Store>> {
    let store = match database_url {
        Some(url) => Store::sqlite(url).await?,
        None => Store::memory(),
    };
    let agent = ClubAgent::new(Arc::new(store), AppMetrics::shared());

    let seed = load_catalog_seed(catalog)?;
    agent
        .seed(seed)
        .await
        .with_context(|| format!("failed seeding catalog from {}", catalog.display()))?;

    Ok(agent)
}
