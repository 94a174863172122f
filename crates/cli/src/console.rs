//! Interactive terminal participant.
//!
//! Screens go to a writer (stderr in the binary, so the result envelope on
//! stdout stays parseable); answers are read line by line. A line is either
//! the number shown next to a choice or the choice text itself.

use std::io::Write;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use colored::Colorize;
use dyad::agent::{DirectorTrial, FeedbackView, MatcherTrial, Selection, TerminalScreen, TrialRenderer, WaitKind};
use dyad::protocol::{ParticipantId, Role};
use dyad::{Error, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

const FEEDBACK_DISPLAY: Duration = Duration::from_millis(1500);

pub struct ConsoleRenderer<R, W> {
	input: R,
	output: W,
	/// Shuffles the on-screen order of choices when set.
	shuffle: Option<StdRng>,
	feedback_display: Duration,
}

impl ConsoleRenderer<BufReader<Stdin>, std::io::Stderr> {
	pub fn stdio() -> Self {
		Self::new(BufReader::new(tokio::io::stdin()), std::io::stderr())
			.with_shuffle(StdRng::from_entropy())
			.with_feedback_display(FEEDBACK_DISPLAY)
	}
}

impl<R, W> ConsoleRenderer<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: Write + Send,
{
	pub fn new(input: R, output: W) -> Self {
		Self {
			input,
			output,
			shuffle: None,
			feedback_display: Duration::ZERO,
		}
	}

	pub fn with_shuffle(mut self, rng: StdRng) -> Self {
		self.shuffle = Some(rng);
		self
	}

	/// How long feedback stays on screen before it is acknowledged.
	pub fn with_feedback_display(mut self, duration: Duration) -> Self {
		self.feedback_display = duration;
		self
	}

	pub fn into_output(self) -> W {
		self.output
	}

	async fn read_line(&mut self) -> Result<String> {
		let mut line = String::new();
		let read = self.input.read_line(&mut line).await?;
		if read == 0 {
			return Err(Error::Render("input closed".into()));
		}
		Ok(line.trim().to_string())
	}

	async fn choose(&mut self, choices: &[String]) -> Result<Selection> {
		if choices.is_empty() {
			return Err(Error::Render("no choices offered".into()));
		}
		let mut shown = choices.to_vec();
		if let Some(rng) = self.shuffle.as_mut() {
			shown.shuffle(rng);
		}

		let started = Instant::now();
		for (i, choice) in shown.iter().enumerate() {
			let _ = writeln!(self.output, "  {} {}", format!("[{}]", i + 1).dimmed(), choice.bold());
		}
		loop {
			let _ = write!(self.output, "{} ", ">".cyan());
			let _ = self.output.flush();
			let answer = self.read_line().await?;
			match parse_choice(&answer, &shown) {
				Some(choice) => return Ok(Selection::new(choice, started.elapsed())),
				None => {
					let _ = writeln!(self.output, "{} pick 1-{} or type a choice", "?".yellow(), shown.len());
				}
			}
		}
	}
}

fn parse_choice(answer: &str, choices: &[String]) -> Option<String> {
	if let Ok(n) = answer.parse::<usize>() {
		return n.checked_sub(1).and_then(|i| choices.get(i)).cloned();
	}
	choices.iter().find(|c| c.eq_ignore_ascii_case(answer)).cloned()
}

#[async_trait]
impl<R, W> TrialRenderer for ConsoleRenderer<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: Write + Send,
{
	async fn waiting(&mut self, kind: WaitKind) {
		let text = match kind {
			WaitKind::WaitingRoom => "You are in the waiting room",
			WaitKind::Partner => "Waiting for partner",
		};
		let _ = writeln!(self.output, "{}", format!("{text}...").dimmed());
	}

	async fn instructions(&mut self, partner: &ParticipantId) -> Result<()> {
		let _ = writeln!(self.output, "\n{}", "Pre-interaction instructions".bold().underline());
		let _ = writeln!(self.output, "You are paired with {}. Time to communicate!", partner.as_str().cyan());
		let _ = writeln!(
			self.output,
			"As the {} you see an object and pick a label so your partner can identify it.",
			"SENDER".bold()
		);
		let _ = writeln!(
			self.output,
			"As the {} you see the sender's label and pick the object you think it names.",
			"RECEIVER".bold()
		);
		let _ = write!(self.output, "Press Enter to continue ");
		let _ = self.output.flush();
		self.read_line().await.map(|_| ())
	}

	async fn director(&mut self, trial: &DirectorTrial) -> Result<Selection> {
		let _ = writeln!(
			self.output,
			"\n{} name {} for {}",
			"SENDER".green().bold(),
			trial.target_object.bold(),
			trial.partner_id.as_str().cyan()
		);
		self.choose(&trial.label_choices).await
	}

	async fn matcher(&mut self, trial: &MatcherTrial) -> Result<Selection> {
		let _ = writeln!(
			self.output,
			"\n{} {} says {}. Which object?",
			"RECEIVER".green().bold(),
			trial.partner_id.as_str().cyan(),
			trial.label.bold()
		);
		self.choose(&trial.object_choices).await
	}

	async fn feedback(&mut self, feedback: &FeedbackView) -> Result<()> {
		let verdict = if feedback.score.is_success() {
			"Correct!".green().bold()
		} else {
			"Incorrect!".red().bold()
		};
		let detail = match feedback.role {
			Role::Director => format!("you said {}, partner picked {}", feedback.label, feedback.guess),
			Role::Matcher => format!("{} meant {}, you picked {}", feedback.label, feedback.target_object, feedback.guess),
		};
		let _ = writeln!(self.output, "{verdict} {}", detail.dimmed());
		if !self.feedback_display.is_zero() {
			tokio::time::sleep(self.feedback_display).await;
		}
		Ok(())
	}

	async fn terminal(&mut self, screen: TerminalScreen) {
		let text = match screen {
			TerminalScreen::SessionComplete => "Finished! Thanks for taking part.".green().bold(),
			TerminalScreen::PartnerDropped => "Your partner has left the session.".yellow().bold(),
			TerminalScreen::ConnectionLost => "Lost connection to the server.".red().bold(),
		};
		let _ = writeln!(self.output, "\n{text}");
	}
}
