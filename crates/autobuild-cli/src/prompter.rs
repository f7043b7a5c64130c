use autobuild_core::requirements::{infer_workflow_type, Requirements, RequirementsPrompter};
use std::io::{BufRead, Write};

/// Asks for requirements on the terminal. Prompts go to stderr so stdout
/// stays clean for `--json`.
pub struct StdinPrompter;

impl StdinPrompter {
    fn ask(&self, input: &mut impl BufRead, question: &str) -> std::io::Result<Option<String>> {
        eprint!("{question}");
        std::io::stderr().flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn gather_from(&self, input: &mut impl BufRead) -> std::io::Result<Option<Requirements>> {
        let Some(task) = self.ask(input, "What do you want to build? ")?.filter(|t| !t.is_empty())
        else {
            return Ok(None);
        };
        let mut req = Requirements::from_task(&task);

        let suggested = infer_workflow_type(&task);
        if let Some(answer) = self.ask(input, &format!("Workflow type [{suggested}]: "))? {
            if !answer.is_empty() {
                req.workflow_type = answer;
            }
        }

        if let Some(answer) = self.ask(input, "Services involved (comma separated, optional): ")? {
            req.services_involved = answer
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        eprintln!("Acceptance criteria, one per line (empty line to finish):");
        while let Some(line) = self.ask(input, "  - ")? {
            if line.is_empty() {
                break;
            }
            req.acceptance_criteria.push(line);
        }
        Ok(Some(req))
    }
}

impl RequirementsPrompter for StdinPrompter {
    fn gather(&self) -> autobuild_core::Result<Option<Requirements>> {
        Ok(self.gather_from(&mut std::io::stdin().lock())?)
    }
}
