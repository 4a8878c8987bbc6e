use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use collavo::api::{CollavoClient, HttpBackend, Project, Task};
use collavo::cache::CacheLayer;
use collavo::config::Config;
use collavo::filters::{task_progress, task_status, FilterSource, TaskFilterField, TaskSort};
use collavo::logging;
use collavo::notifications::{to_bangkok, NOTIFICATION_TIMEZONE};
use collavo::state::{EventBoard, TaskBoard};

#[derive(Parser, Debug)]
#[command(name = "collavo")]
#[command(about = "Command-line view of a Collavo project")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/collavo/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Project id to use instead of default_project
  #[arg(short, long)]
  project: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Project overview
  Project,
  /// List tasks with their subtask progress
  Tasks {
    /// Only tasks with this status (pending, in-progress, completed)
    #[arg(long)]
    status: Option<String>,
    /// Only tasks assigned to this member (name or user id)
    #[arg(long)]
    assignee: Option<String>,
    #[arg(long, value_enum, default_value_t = TaskSort::Deadline)]
    sort: TaskSort,
  },
  /// List events
  Events,
  /// List members and their permissions
  Members,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging)?;

  let project_id = args
    .project
    .or_else(|| config.default_project.clone())
    .ok_or_else(|| eyre!("No project given. Pass --project or set default_project in the config"))?;

  let backend = HttpBackend::from_config(&config)?;
  let client = CollavoClient::new(backend, CacheLayer::with_ttl(config.cache.ttl()));

  match args.command {
    Command::Project => {
      let board = TaskBoard::load(client, &project_id).await?;
      print_project(board.project(), board.tasks());
    }
    Command::Tasks {
      status,
      assignee,
      sort,
    } => {
      let board = TaskBoard::load(client, &project_id).await?;
      let mut filters = Vec::new();
      if let Some(status) = status {
        filters.push((TaskFilterField::Status, Some(status)));
      }
      if let Some(assignee) = assignee {
        let user_id = resolve_member(board.project(), &assignee)?;
        filters.push((TaskFilterField::Assignee, Some(user_id)));
      }

      let tasks = board.visible_tasks(&filters, sort);
      if tasks.is_empty() && !filters.is_empty() {
        let statuses: Vec<String> = TaskFilterField::Status
          .unique_values(board.tasks())
          .into_iter()
          .flatten()
          .collect();
        println!("No matching tasks. Statuses in this project: {}", statuses.join(", "));
      }

      for task in tasks {
        print_task(board.project(), task);
      }
    }
    Command::Events => {
      let board = EventBoard::load(client, &project_id).await?;
      for event in board.events() {
        let local = to_bangkok(event.datetime);
        print!("{}  {}", local.format("%Y-%m-%d %H:%M"), event.title);
        if let Some(location) = &event.location {
          print!("  @ {}", location);
        }
        println!();
      }
      println!("(times in {})", NOTIFICATION_TIMEZONE);
    }
    Command::Members => {
      let project = client.get_project(&project_id).await?;
      for member in &project.members {
        let leader = if project.is_leader(&member.user_id) {
          " (leader)"
        } else {
          ""
        };
        println!(
          "{}{}  {}",
          member.name,
          leader,
          member.role.as_deref().unwrap_or("-")
        );
        let labels = member.permission_labels();
        if !labels.is_empty() {
          println!("  {}", labels.join(", "));
        }
      }
    }
  }

  Ok(())
}

/// Member user id by name (case-insensitive) or id.
fn resolve_member(project: &Project, assignee: &str) -> Result<String> {
  project
    .members
    .iter()
    .find(|m| m.user_id == assignee || m.name.eq_ignore_ascii_case(assignee))
    .map(|m| m.user_id.clone())
    .ok_or_else(|| eyre!("No member named {} in project {}", assignee, project.name))
}

fn member_name<'a>(project: &'a Project, user_id: &'a str) -> &'a str {
  project
    .member(user_id)
    .map(|m| m.name.as_str())
    .unwrap_or(user_id)
}

fn print_project(project: &Project, tasks: &[Task]) {
  println!("{} ({})", project.name, project.id);
  if let Some(description) = &project.description {
    println!("{}", description);
  }
  if let Some(deadline) = project.deadline {
    println!("Deadline: {}", to_bangkok(deadline).format("%Y-%m-%d"));
  }
  if let Some(leader) = &project.leader_id {
    println!("Leader: {}", member_name(project, leader));
  }

  let completed = tasks
    .iter()
    .filter(|t| task_status(t) == "completed")
    .count();
  println!(
    "{} members, {}/{} tasks completed",
    project.members.len(),
    completed,
    tasks.len()
  );
}

fn print_task(project: &Project, task: &Task) {
  let (done, total) = task_progress(task);
  let importance = task.importance.map(|i| i.label()).unwrap_or("-");
  let deadline = task
    .deadline
    .map(|d| to_bangkok(d).format("%Y-%m-%d").to_string())
    .unwrap_or_else(|| "-".to_string());
  let assignee = task
    .assigned_id
    .as_deref()
    .map(|id| member_name(project, id))
    .unwrap_or("-");

  println!(
    "[{}] {}  {}/{}  {}  {}  {}",
    task_status(task),
    task.title,
    done,
    total,
    importance,
    deadline,
    assignee
  );
}
