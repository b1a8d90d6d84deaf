//! CLI subcommands.

use clap::Subcommand;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
  /// Probe the backend and print connectivity, state and metrics
  #[command(visible_alias = "st")]
  Status,

  /// Fetch Google Fit health data
  #[command(visible_alias = "hd")]
  HealthData {
    /// Days of history to fetch
    #[arg(short, long, default_value_t = 30)]
    days: u32,

    /// Restrict to these fields (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    fields: Vec<String>,
  },

  /// Ask for AI insights about a symptom
  Insight {
    symptom: String,

    #[arg(short, long, default_value = "Mild")]
    severity: String,

    /// Extra health metrics as a JSON object
    #[arg(long)]
    metrics: Option<String>,
  },

  /// Run the risk prediction model
  #[command(visible_alias = "predict")]
  Prediction {
    #[arg(long)]
    age: Option<u32>,
    #[arg(long)]
    bmi: Option<f64>,
    #[arg(long)]
    glucose: Option<f64>,
    /// Systolic blood pressure
    #[arg(long)]
    sbp: Option<f64>,
    /// Diastolic blood pressure
    #[arg(long)]
    dbp: Option<f64>,
  },

  /// Get biorhythm advice for a chronotype and medication time
  #[command(visible_alias = "bio")]
  Biorhythm {
    #[arg(long, default_value = "morning")]
    chronotype: String,

    #[arg(long, default_value = "08:00")]
    medication_time: String,
  },

  /// Get environment advice
  #[command(visible_alias = "env")]
  Environment,

  /// Log a symptom
  #[command(visible_alias = "log")]
  SubmitSymptom {
    symptom: String,

    #[arg(short, long, default_value = "Mild")]
    severity: String,

    #[arg(short, long)]
    notes: Option<String>,

    #[arg(long)]
    duration: Option<String>,

    /// Comma separated triggers
    #[arg(long, value_delimiter = ',')]
    triggers: Vec<String>,

    /// If the submission is queued, keep running for up to this many
    /// seconds so it can be replayed once the backend is reachable
    #[arg(short, long)]
    wait: Option<u64>,
  },

  /// Run the connectivity monitor, printing state changes and replays
  Watch {
    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,
  },
}

impl Command {
  /// Whether the command's output should bypass the response cache
  pub fn is_mutation(&self) -> bool {
    matches!(self, Command::SubmitSymptom { .. })
  }
}
